use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chrono::Utc;
use cloud_audit_reporter::rules::catalog;
use cloud_audit_reporter::{
    evaluate, reduce, AttrValue, Datapoint, MetricQuery, MetricResult, MetricValue, Resource,
    Statistic,
};

fn rule_evaluation_benchmark(c: &mut Criterion) {
    let rules = vec![
        catalog::cpu_high("rds-instance", 80.0),
        catalog::cpu_idle("rds-instance", 2.0),
        catalog::low_connections("rds-instance", 3.0),
        catalog::iops_low("rds-instance", 100.0),
        catalog::unencrypted("rds-instance"),
        catalog::public_access("rds-instance"),
        catalog::retention_short("rds-instance", 7.0),
    ];
    let resource = Resource::new("db-1", "rds-instance")
        .with_attr("encrypted", AttrValue::Bool(false))
        .with_attr("public", AttrValue::Bool(true))
        .with_attr("retention_days", AttrValue::Number(3.0));
    let results = vec![
        MetricResult {
            query: MetricQuery {
                resource_id: "db-1".to_string(),
                metric_name: "CPUUtilization".to_string(),
                statistic: Statistic::Average,
                lookback_seconds: 604_800,
                period_seconds: 3600,
            },
            value: MetricValue::Value(85.0),
        },
        MetricResult {
            query: MetricQuery {
                resource_id: "db-1".to_string(),
                metric_name: "DatabaseConnections".to_string(),
                statistic: Statistic::Average,
                lookback_seconds: 604_800,
                period_seconds: 3600,
            },
            value: MetricValue::Value(1.0),
        },
        MetricResult {
            query: MetricQuery {
                resource_id: "db-1".to_string(),
                metric_name: "TotalIOPS".to_string(),
                statistic: Statistic::Sum,
                lookback_seconds: 604_800,
                period_seconds: 3600,
            },
            value: MetricValue::Unavailable,
        },
    ];

    c.bench_function("evaluate_full_catalog", |b| {
        b.iter(|| black_box(evaluate(black_box(&resource), black_box(&results), &rules)))
    });
}

fn datapoint_reduction_benchmark(c: &mut Criterion) {
    let now = Utc::now();
    let points: Vec<Datapoint> = (0..168)
        .map(|i| Datapoint {
            timestamp: now,
            value: (i % 100) as f64,
        })
        .collect();

    c.bench_function("reduce_week_of_hourly_datapoints", |b| {
        b.iter(|| {
            black_box(reduce(Statistic::Sum, black_box(&points)));
            black_box(reduce(Statistic::Average, black_box(&points)));
            black_box(reduce(Statistic::Maximum, black_box(&points)));
            black_box(reduce(Statistic::Percentile(95), black_box(&points)));
        })
    });
}

criterion_group!(benches, rule_evaluation_benchmark, datapoint_reduction_benchmark);
criterion_main!(benches);
