use serde::{Deserialize, Serialize};

/// A physical place tracked on a tag. The name is fixed at setup time;
/// visitors are append-only from the controller's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub visitors: Vec<Visitor>,
}

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visitors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    pub name: String,
}

impl Visitor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_round_trips_through_json() {
        let mut location = Location::new("Cafe");
        location.visitors.push(Visitor::new("Alice"));
        location.visitors.push(Visitor::new("Bob"));

        let bytes = serde_json::to_vec(&location).expect("encode");
        let decoded: Location = serde_json::from_slice(&bytes).expect("decode");

        assert_eq!(decoded, location);
        assert_eq!(
            decoded
                .visitors
                .iter()
                .map(|v| v.name.as_str())
                .collect::<Vec<_>>(),
            vec!["Alice", "Bob"]
        );
    }

    #[test]
    fn location_without_visitors_field_decodes_to_empty_list() {
        let decoded: Location = serde_json::from_str(r#"{"name":"Cafe"}"#).expect("decode");
        assert_eq!(decoded, Location::new("Cafe"));
    }
}
