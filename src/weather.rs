//! Weather tool. Conditions are synthesized locally from the location name
//! rather than fetched, which keeps the answer deterministic per location.

use std::sync::Arc;

use crate::registry::{params_object, ToolDescriptor};
use crate::tool_args::str_arg;
use crate::ToolValue;

/// Base temperature in the 10..40 Celsius band, derived from the location.
fn base_celsius(location: &str) -> f64 {
    let sum: u32 = location
        .to_lowercase()
        .bytes()
        .map(|b| b as u32)
        .sum();
    (sum % 30 + 10) as f64
}

pub(crate) fn tools() -> Vec<ToolDescriptor> {
    vec![ToolDescriptor {
        name: "get_current_weather".to_string(),
        description: "Get the current weather".to_string(),
        parameters: params_object(
            serde_json::json!({
                "location": {
                    "type": "string",
                    "description": "The city and state, e.g. San Francisco, CA",
                },
                "format": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "The temperature unit to use. Infer this from the users location.",
                },
            }),
            &["location", "format"],
        ),
        handler: Arc::new(|args, _input, _calls| {
            let location = str_arg(args, "location")?;
            let format = str_arg(args, "format").unwrap_or("celsius");
            let celsius = base_celsius(location);
            let (temp, unit) = if format.eq_ignore_ascii_case("fahrenheit") {
                (celsius * 9.0 / 5.0 + 32.0, "F")
            } else {
                (celsius, "C")
            };
            let record = ToolValue::Record(vec![
                ("location".to_string(), ToolValue::Text(location.to_string())),
                ("temp".to_string(), ToolValue::Number(temp.round())),
                ("unit".to_string(), ToolValue::Text(unit.to_string())),
            ]);
            Some(record.render())
        }),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_args::ToolArguments;

    fn call(location: &str, format: &str) -> Option<String> {
        let mut args = ToolArguments::new();
        args.insert("location".to_string(), location.to_string());
        args.insert("format".to_string(), format.to_string());
        let descriptors = tools();
        (descriptors[0].handler)(&args, "", &[])
    }

    #[test]
    fn reports_location_and_temperature() {
        let out = call("Boston, MA", "fahrenheit").unwrap();
        assert!(out.contains("Boston"));
        assert!(out.contains("temp:"));
        assert!(out.contains("unit: F"));
    }

    #[test]
    fn is_deterministic_per_location() {
        assert_eq!(call("Lisbon", "celsius"), call("Lisbon", "celsius"));
    }

    #[test]
    fn fahrenheit_exceeds_celsius_reading() {
        let c = call("Oslo", "celsius").unwrap();
        let f = call("Oslo", "fahrenheit").unwrap();
        let parse = |s: &str| -> f64 {
            s.lines()
                .find(|l| l.starts_with("temp:"))
                .and_then(|l| l.trim_start_matches("temp:").trim().parse().ok())
                .unwrap()
        };
        assert!(parse(&f) > parse(&c));
    }

    #[test]
    fn missing_location_yields_nothing() {
        let mut args = ToolArguments::new();
        args.insert("format".to_string(), "celsius".to_string());
        let descriptors = tools();
        assert!((descriptors[0].handler)(&args, "", &[]).is_none());
    }
}
