//! Prometheus text exposition format.
//!
//! Renders registry snapshots into the text format scraped by a Prometheus
//! server or compatible agent.

use std::fmt::Write;

use crate::registry::{FamilySnapshot, SampleValue};

/// Content type of [`render_prometheus`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render family snapshots into Prometheus text format.
///
/// Every family gets HELP and TYPE lines, followed by one line per series
/// (histograms and summaries expand into their bucket/quantile, `_sum`
/// and `_count` lines).
pub fn render_prometheus(families: &[FamilySnapshot]) -> String {
    let mut out = String::new();

    for family in families {
        let _ = writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help));
        let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind.as_str());

        for series in &family.series {
            let pairs: Vec<(&str, &str)> = family
                .label_names
                .iter()
                .map(String::as_str)
                .zip(series.label_values.iter().map(String::as_str))
                .collect();

            match &series.value {
                SampleValue::Scalar(value) => {
                    write_sample(&mut out, &family.name, &pairs, None, *value);
                }
                SampleValue::Histogram { buckets, sum, count } => {
                    let bucket_name = format!("{}_bucket", family.name);
                    for (bound, cumulative) in buckets {
                        let le = format_value(*bound);
                        write_sample(
                            &mut out,
                            &bucket_name,
                            &pairs,
                            Some(("le", le.as_str())),
                            *cumulative as f64,
                        );
                    }
                    write_sample(&mut out, &bucket_name, &pairs, Some(("le", "+Inf")), *count as f64);
                    write_sample(&mut out, &format!("{}_sum", family.name), &pairs, None, *sum);
                    write_sample(
                        &mut out,
                        &format!("{}_count", family.name),
                        &pairs,
                        None,
                        *count as f64,
                    );
                }
                SampleValue::Summary { quantiles, sum, count } => {
                    for (q, value) in quantiles {
                        let q = format_value(*q);
                        write_sample(&mut out, &family.name, &pairs, Some(("quantile", q.as_str())), *value);
                    }
                    write_sample(&mut out, &format!("{}_sum", family.name), &pairs, None, *sum);
                    write_sample(
                        &mut out,
                        &format!("{}_count", family.name),
                        &pairs,
                        None,
                        *count as f64,
                    );
                }
            }
        }
    }

    out
}

fn write_sample(
    out: &mut String,
    name: &str,
    labels: &[(&str, &str)],
    extra: Option<(&str, &str)>,
    value: f64,
) {
    out.push_str(name);
    let all = labels.iter().copied().chain(extra);
    let mut first = true;
    for (key, val) in all {
        out.push(if first { '{' } else { ',' });
        first = false;
        let _ = write!(out, "{key}=\"{}\"", escape_label_value(val));
    }
    if !first {
        out.push('}');
    }
    out.push(' ');
    out.push_str(&format_value(value));
    out.push('\n');
}

/// Format a sample value the way Prometheus parses it.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::summary::SummaryOpts;

    #[test]
    fn render_empty() {
        assert_eq!(render_prometheus(&[]), "");
    }

    #[test]
    fn render_labelless_counter_has_zero_line() {
        let registry = Registry::new();
        registry
            .counter("todos_created_total", "Total number of todos created", &[])
            .unwrap();

        let output = registry.render();
        assert_eq!(
            output,
            "# HELP todos_created_total Total number of todos created\n\
             # TYPE todos_created_total counter\n\
             todos_created_total 0\n"
        );
    }

    #[test]
    fn render_labeled_gauge() {
        let registry = Registry::new();
        let gauge = registry
            .gauge("todos_total", "Total number of todos in the system", &["status"])
            .unwrap();
        gauge.set(&[("status", "active")], 3.0).unwrap();
        gauge.set(&[("status", "completed")], 1.0).unwrap();

        let output = registry.render();
        assert!(output.contains("# TYPE todos_total gauge\n"));
        assert!(output.contains("todos_total{status=\"active\"} 3\n"));
        assert!(output.contains("todos_total{status=\"completed\"} 1\n"));
    }

    #[test]
    fn render_histogram_lines() {
        let registry = Registry::new();
        let histogram = registry
            .histogram("db_query_duration_seconds", "Query time", &["operation"], &[0.01, 0.1])
            .unwrap();
        histogram.observe(&[("operation", "select")], 0.05).unwrap();

        let output = registry.render();
        assert!(output.contains("db_query_duration_seconds_bucket{operation=\"select\",le=\"0.01\"} 0\n"));
        assert!(output.contains("db_query_duration_seconds_bucket{operation=\"select\",le=\"0.1\"} 1\n"));
        assert!(output.contains("db_query_duration_seconds_bucket{operation=\"select\",le=\"+Inf\"} 1\n"));
        assert!(output.contains("db_query_duration_seconds_sum{operation=\"select\"} 0.05\n"));
        assert!(output.contains("db_query_duration_seconds_count{operation=\"select\"} 1\n"));
    }

    #[test]
    fn render_summary_lines() {
        let registry = Registry::new();
        let summary = registry
            .summary(
                "api_latency_seconds",
                "Latency",
                &[],
                SummaryOpts {
                    quantiles: vec![0.5],
                    ..Default::default()
                },
            )
            .unwrap();
        summary.observe(&[], 2.0).unwrap();

        let output = registry.render();
        assert!(output.contains("# TYPE api_latency_seconds summary\n"));
        assert!(output.contains("api_latency_seconds{quantile=\"0.5\"} 2\n"));
        assert!(output.contains("api_latency_seconds_sum 2\n"));
        assert!(output.contains("api_latency_seconds_count 1\n"));
    }

    #[test]
    fn render_escapes_label_values() {
        let registry = Registry::new();
        let counter = registry.counter("odd_total", "Odd", &["route"]).unwrap();
        counter.inc(&[("route", "a\"b\\c\nd")]).unwrap();

        let output = registry.render();
        assert!(output.contains(r#"odd_total{route="a\"b\\c\nd"} 1"#));
    }

    #[test]
    fn render_is_deterministic() {
        let registry = Registry::new();
        let counter = registry.counter("c_total", "C", &["k"]).unwrap();
        for k in ["b", "a", "c"] {
            counter.inc(&[("k", k)]).unwrap();
        }
        assert_eq!(registry.render(), registry.render());
        let output = registry.render();
        let a = output.find("k=\"a\"").unwrap();
        let c = output.find("k=\"c\"").unwrap();
        assert!(a < c);
    }

    #[test]
    fn format_special_values() {
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(0.005), "0.005");
        assert_eq!(format_value(12.0), "12");
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let registry = Registry::new();
        let counter = registry.counter("x_total", "X", &["a"]).unwrap();
        counter.inc(&[("a", "1")]).unwrap();

        // Every non-comment line is `name{labels} value` or `name value`.
        for line in registry.render().lines() {
            if line.starts_with('#') {
                continue;
            }
            let (_, value) = line.rsplit_once(' ').unwrap();
            assert!(value.parse::<f64>().is_ok() || value == "NaN", "bad line: {line}");
        }
    }
}
