use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Types that can be requested from the model as strict JSON.
///
/// Strict structured output rejects schemas that allow extra keys, leave
/// any property out of `required`, use `$ref` or carry `default` values, so
/// the generated schema is rewritten before it is sent.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn openai_schema() -> Value {
        let mut value = serde_json::to_value(schema_for!(Self)).unwrap_or_default();

        let definitions = value
            .as_object_mut()
            .and_then(|map| map.remove("definitions"))
            .unwrap_or(Value::Null);
        inline_refs(&mut value, &definitions);
        close_objects(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("$schema");
        }
        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("default");
            if map.get("type").and_then(Value::as_str) == Some("object") {
                let required = required_keys(map);
                map.insert("additionalProperties".into(), Value::Bool(false));
                map.insert("required".into(), Value::Array(required));
            }
            for (key, child) in map.iter_mut() {
                // Keys under `properties` are field names, not keywords.
                match (key.as_str(), child) {
                    ("properties", Value::Object(props)) => {
                        props.values_mut().for_each(close_objects)
                    }
                    (_, child) => close_objects(child),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn required_keys(map: &Map<String, Value>) -> Vec<Value> {
    map.get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().map(Value::String).collect())
        .unwrap_or_default()
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(def) = target {
                *value = def;
                inline_refs(value, definitions);
                return;
            }

            // schemars wraps documented refs in a single-element allOf
            let single = match map.get("allOf") {
                Some(Value::Array(all_of)) if all_of.len() == 1 => Some(all_of[0].clone()),
                _ => None,
            };
            if let Some(inner) = single {
                *value = inner;
                inline_refs(value, definitions);
                return;
            }

            for v in map.values_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "snake_case")]
    #[allow(dead_code)]
    enum Kind {
        Taxi,
        Other,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Location {
        city: Option<String>,
        country: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Report {
        kind: Kind,
        location: Location,
        loss: Option<f64>,
    }

    #[test]
    fn nested_types_are_inlined() {
        let schema = Report::openai_schema();
        let obj = schema.as_object().unwrap();
        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));
        assert!(!serde_json::to_string(&schema).unwrap().contains("$ref"));

        let location = &obj["properties"]["location"];
        assert_eq!(location["type"], "object");
        assert_eq!(location["additionalProperties"], false);
    }

    #[derive(Deserialize, JsonSchema)]
    #[serde(default)]
    #[allow(dead_code)]
    struct Lenient {
        default: bool,
        score: f64,
        tags: Vec<String>,
    }

    impl Default for Lenient {
        fn default() -> Self {
            Self {
                default: false,
                score: 0.5,
                tags: Vec::new(),
            }
        }
    }

    #[test]
    fn defaults_are_stripped_but_fields_named_default_survive() {
        let schema = Lenient::openai_schema();
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("default"));
        assert!(props.values().all(|p| p.get("default").is_none()));
        assert!(schema.get("default").is_none());
    }

    #[test]
    fn optional_fields_are_still_required() {
        let schema = Location::openai_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(required.contains(&"city"));
        assert!(required.contains(&"country"));
    }
}
