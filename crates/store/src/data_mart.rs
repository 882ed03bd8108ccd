//! Rendering of structured business records into searchable text.
//!
//! Three record types have dedicated layouts; anything else falls back to a
//! `<Type> Data:` header followed by one `Key: value` line per field.
//! Keys are rendered in title case with underscores as spaces.

use serde_json::{Map, Value};

pub fn format_record(data_type: &str, data: &Map<String, Value>) -> String {
    match data_type {
        "business_metrics" => format_business_metrics(data),
        "user_analytics" => format_user_analytics(data),
        "gaming_data" => format_gaming_data(data),
        other => {
            let mut parts = vec![format!("{} Data:", title_case(other))];
            for (key, value) in data {
                parts.push(format!("{}: {}", title_case(key), display(value)));
            }
            parts.join("\n")
        }
    }
}

fn format_business_metrics(data: &Map<String, Value>) -> String {
    let mut parts = vec!["Business Metrics Report:".to_string()];
    for (metric, value) in data {
        parts.push(format!("- {}: {}", title_case(metric), display(value)));
    }
    parts.join("\n")
}

fn format_user_analytics(data: &Map<String, Value>) -> String {
    let mut parts = vec!["User Analytics Data:".to_string()];
    if let Some(Value::Object(metrics)) = data.get("engagement_metrics") {
        parts.push("Engagement Metrics:".into());
        for (metric, value) in metrics {
            parts.push(format!("  - {}: {}", title_case(metric), display(value)));
        }
    }
    if let Some(Value::Array(patterns)) = data.get("behavior_patterns") {
        parts.push("Behavior Patterns:".into());
        for pattern in patterns {
            parts.push(format!("  - {}", display(pattern)));
        }
    }
    parts.join("\n")
}

fn format_gaming_data(data: &Map<String, Value>) -> String {
    let mut parts = vec!["Gaming Data Analysis:".to_string()];
    if let Some(Value::Object(games)) = data.get("game_performance") {
        parts.push("Game Performance:".into());
        for (game, metrics) in games {
            parts.push(format!("  {game}:"));
            if let Value::Object(metrics) = metrics {
                for (metric, value) in metrics {
                    parts.push(format!("    - {}: {}", title_case(metric), display(value)));
                }
            }
        }
    }
    parts.join("\n")
}

/// `daily_active_users` → `Daily Active Users`.
pub fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn business_metrics_layout() {
        let text = format_record(
            "business_metrics",
            &object(json!({"total_revenue": 1200000, "churn_rate": "2.1%"})),
        );
        assert_eq!(
            text,
            "Business Metrics Report:\n- Churn Rate: 2.1%\n- Total Revenue: 1200000"
        );
    }

    #[test]
    fn user_analytics_layout() {
        let text = format_record(
            "user_analytics",
            &object(json!({
                "engagement_metrics": {"daily_active_users": 5400},
                "behavior_patterns": ["weekend spikes"]
            })),
        );
        assert!(text.starts_with("User Analytics Data:\nEngagement Metrics:"));
        assert!(text.contains("  - Daily Active Users: 5400"));
        assert!(text.contains("Behavior Patterns:\n  - weekend spikes"));
    }

    #[test]
    fn gaming_data_layout() {
        let text = format_record(
            "gaming_data",
            &object(json!({"game_performance": {"Slots": {"avg_session_minutes": 14}}})),
        );
        assert_eq!(
            text,
            "Gaming Data Analysis:\nGame Performance:\n  Slots:\n    - Avg Session Minutes: 14"
        );
    }

    #[test]
    fn generic_layout() {
        let text = format_record("store_sales", &object(json!({"region": "EMEA"})));
        assert_eq!(text, "Store Sales Data:\nRegion: EMEA");
    }

    #[test]
    fn title_case_lowercases_tail() {
        assert_eq!(title_case("DAU_count"), "Dau Count");
        assert_eq!(title_case("__x__y"), "X Y");
    }
}
