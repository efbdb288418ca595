//! Typed database query filters.

use serde_json::{Value, json};

/// A filter expression understood by the database query endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All sub-filters must match.
    And(Vec<Filter>),
    CheckboxEquals { property: String, value: bool },
    NumberEquals { property: String, value: f64 },
    StatusEquals { property: String, value: String },
    RelationIsNotEmpty { property: String },
    RelationContains { property: String, id: String },
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn relation_is_not_empty(property: impl Into<String>) -> Self {
        Self::RelationIsNotEmpty {
            property: property.into(),
        }
    }

    pub fn relation_contains(property: impl Into<String>, id: impl Into<String>) -> Self {
        Self::RelationContains {
            property: property.into(),
            id: id.into(),
        }
    }

    /// Render as the JSON the API expects under `filter`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::And(filters) => {
                json!({ "and": filters.iter().map(Filter::to_json).collect::<Vec<_>>() })
            }
            Self::CheckboxEquals { property, value } => {
                json!({ "property": property, "checkbox": { "equals": value } })
            }
            Self::NumberEquals { property, value } => {
                json!({ "property": property, "number": { "equals": value } })
            }
            Self::StatusEquals { property, value } => {
                json!({ "property": property, "status": { "equals": value } })
            }
            Self::RelationIsNotEmpty { property } => {
                json!({ "property": property, "relation": { "is_not_empty": true } })
            }
            Self::RelationContains { property, id } => {
                json!({ "property": property, "relation": { "contains": id } })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_filter_json() {
        let filter = Filter::and([
            Filter::NumberEquals {
                property: "フラグ".into(),
                value: 0.0,
            },
            Filter::relation_is_not_empty("顧問先"),
        ]);
        assert_eq!(
            filter.to_json(),
            json!({
                "and": [
                    { "property": "フラグ", "number": { "equals": 0.0 } },
                    { "property": "顧問先", "relation": { "is_not_empty": true } }
                ]
            })
        );
    }

    #[test]
    fn relation_contains_json() {
        assert_eq!(
            Filter::relation_contains("Client", "c1").to_json(),
            json!({ "property": "Client", "relation": { "contains": "c1" } })
        );
    }

    #[test]
    fn status_and_checkbox_json() {
        let status = Filter::StatusEquals {
            property: "State".into(),
            value: "Todo".into(),
        };
        assert_eq!(
            status.to_json(),
            json!({ "property": "State", "status": { "equals": "Todo" } })
        );
        let checkbox = Filter::CheckboxEquals {
            property: "Done".into(),
            value: false,
        };
        assert_eq!(
            checkbox.to_json(),
            json!({ "property": "Done", "checkbox": { "equals": false } })
        );
    }
}
