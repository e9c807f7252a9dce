use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type ConceptId = Uuid;
pub type RelationshipId = Uuid;

/// Canonical entity types a concept can carry.
///
/// The enumeration is closed: scoring divides distinct-type counts by
/// [`EntityType::COUNT`], so adding a variant changes every type-diversity value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Concept,
    Method,
    Finding,
    Problem,
    Dataset,
    Metric,
    Innovation,
    Limitation,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::Concept,
        EntityType::Method,
        EntityType::Finding,
        EntityType::Problem,
        EntityType::Dataset,
        EntityType::Metric,
        EntityType::Innovation,
        EntityType::Limitation,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Concept => "concept",
            EntityType::Method => "method",
            EntityType::Finding => "finding",
            EntityType::Problem => "problem",
            EntityType::Dataset => "dataset",
            EntityType::Metric => "metric",
            EntityType::Innovation => "innovation",
            EntityType::Limitation => "limitation",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-type attributes of a concept.
///
/// Each entity type has its own narrow set of optional fields; the variant
/// tag doubles as the concept's entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum ConceptProperties {
    Concept {
        #[serde(default)]
        aliases: Vec<String>,
    },
    Method {
        #[serde(default)]
        category: Option<String>,
    },
    Finding {
        #[serde(default)]
        effect_size: Option<f64>,
        #[serde(default)]
        direction: Option<String>,
    },
    Problem {
        #[serde(default)]
        open: bool,
    },
    Dataset {
        #[serde(default)]
        record_count: Option<u64>,
        #[serde(default)]
        domain: Option<String>,
    },
    Metric {
        #[serde(default)]
        unit: Option<String>,
    },
    Innovation {
        #[serde(default)]
        novelty: Option<f64>,
    },
    Limitation {
        #[serde(default)]
        severity: Option<String>,
    },
}

impl ConceptProperties {
    pub fn entity_type(&self) -> EntityType {
        match self {
            ConceptProperties::Concept { .. } => EntityType::Concept,
            ConceptProperties::Method { .. } => EntityType::Method,
            ConceptProperties::Finding { .. } => EntityType::Finding,
            ConceptProperties::Problem { .. } => EntityType::Problem,
            ConceptProperties::Dataset { .. } => EntityType::Dataset,
            ConceptProperties::Metric { .. } => EntityType::Metric,
            ConceptProperties::Innovation { .. } => EntityType::Innovation,
            ConceptProperties::Limitation { .. } => EntityType::Limitation,
        }
    }

    /// Empty property set for the given entity type.
    pub fn empty(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Concept => ConceptProperties::Concept { aliases: Vec::new() },
            EntityType::Method => ConceptProperties::Method { category: None },
            EntityType::Finding => ConceptProperties::Finding {
                effect_size: None,
                direction: None,
            },
            EntityType::Problem => ConceptProperties::Problem { open: false },
            EntityType::Dataset => ConceptProperties::Dataset {
                record_count: None,
                domain: None,
            },
            EntityType::Metric => ConceptProperties::Metric { unit: None },
            EntityType::Innovation => ConceptProperties::Innovation { novelty: None },
            EntityType::Limitation => ConceptProperties::Limitation { severity: None },
        }
    }
}

impl Default for ConceptProperties {
    fn default() -> Self {
        Self::empty(EntityType::Concept)
    }
}

/// An extracted unit of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub name: String,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub properties: ConceptProperties,
}

impl Concept {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            definition: None,
            properties: ConceptProperties::empty(entity_type),
        }
    }

    pub fn with_id(mut self, id: ConceptId) -> Self {
        self.id = id;
        self
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    pub fn with_properties(mut self, properties: ConceptProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.properties.entity_type()
    }

    /// Text handed to embedding providers and the TF-IDF tokenizer.
    pub fn embedding_text(&self) -> String {
        match &self.definition {
            Some(def) if !def.trim().is_empty() => format!("{}: {}", self.name, def),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Supports,
    Contradicts,
    Uses,
    Extends,
    RelatedTo,
    Other(String),
}

impl Default for RelationKind {
    fn default() -> Self {
        RelationKind::RelatedTo
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationKind::Supports => "supports",
            RelationKind::Contradicts => "contradicts",
            RelationKind::Uses => "uses",
            RelationKind::Extends => "extends",
            RelationKind::RelatedTo => "related_to",
            RelationKind::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

/// A directed relationship between two concepts of the same project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub source: ConceptId,
    pub target: ConceptId,
    #[serde(default)]
    pub kind: RelationKind,
    #[serde(default = "Relationship::default_weight")]
    pub weight: f64,
}

impl Relationship {
    pub fn new(source: ConceptId, target: ConceptId, kind: RelationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target,
            kind,
            weight: Self::default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    fn default_weight() -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_tag_is_the_entity_type() {
        let concept = Concept::new("transformer attention", EntityType::Method).with_properties(
            ConceptProperties::Method {
                category: Some("architecture".into()),
            },
        );
        let json = serde_json::to_value(&concept).unwrap();
        assert_eq!(json["properties"]["entity_type"], "method");
        assert_eq!(json["properties"]["category"], "architecture");

        let back: Concept = serde_json::from_value(json).unwrap();
        assert_eq!(back.entity_type(), EntityType::Method);
    }

    #[test]
    fn missing_properties_default_to_plain_concept() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "name": "sparsity",
        });
        let concept: Concept = serde_json::from_value(json).unwrap();
        assert_eq!(concept.entity_type(), EntityType::Concept);
        assert!(concept.definition.is_none());
    }

    #[test]
    fn unknown_property_fields_for_a_type_are_rejected_by_tag() {
        let json = serde_json::json!({ "entity_type": "not_a_type" });
        assert!(serde_json::from_value::<ConceptProperties>(json).is_err());
    }

    #[test]
    fn embedding_text_joins_definition() {
        let c = Concept::new("graph", EntityType::Concept).with_definition("nodes and edges");
        assert_eq!(c.embedding_text(), "graph: nodes and edges");
        let bare = Concept::new("graph", EntityType::Concept).with_definition("  ");
        assert_eq!(bare.embedding_text(), "graph");
    }

    #[test]
    fn entity_type_count_is_eight() {
        assert_eq!(EntityType::COUNT, 8);
        for t in EntityType::ALL {
            assert_eq!(ConceptProperties::empty(t).entity_type(), t);
        }
    }
}
