//! Write statements. Nothing here touches the database directly: statements
//! are built and handed to the owning handle's buffer, which applies them in
//! one transaction on commit.

use groom_core::types::{EdgeId, PropertyValue, VertexId, NODE_TYPE};
use neo4rs::{query, Query};

use crate::queries::{bind, quote};

/// Remove a vertex and every edge touching it.
pub fn delete_vertex(id: VertexId) -> Query {
    query("MATCH (n) WHERE id(n) = $id DETACH DELETE n").param("id", id.0)
}

pub fn delete_edge(id: EdgeId) -> Query {
    query("MATCH ()-[r]->() WHERE id(r) = $id DELETE r").param("id", id.0)
}

/// Overwrite the given properties of a vertex. Returns `None` when there is
/// nothing to set.
pub fn set_properties(id: VertexId, properties: &[(String, PropertyValue)]) -> Option<Query> {
    let cypher = set_properties_cypher(properties)?;
    let q = properties
        .iter()
        .enumerate()
        .fold(query(&cypher).param("id", id.0), |q, (i, (_, value))| {
            bind(q, &format!("p{i}"), value)
        });
    Some(q)
}

/// Restoring `aai-node-type` also sets the label type enumeration reads.
fn set_properties_cypher(properties: &[(String, PropertyValue)]) -> Option<String> {
    if properties.is_empty() {
        return None;
    }
    let mut assignments: Vec<String> = properties
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("n.{} = $p{i}", quote(name)))
        .collect();
    for (name, value) in properties {
        if let (NODE_TYPE, PropertyValue::String(node_type)) = (name.as_str(), value) {
            assignments.push(format!("n:{}", quote(node_type)));
        }
    }
    Some(format!(
        "MATCH (n) WHERE id(n) = $id SET {}",
        assignments.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_property_set_builds_no_statement() {
        assert!(set_properties(VertexId(1), &[]).is_none());
        let props = vec![("aai-uri".to_string(), PropertyValue::from("1dummy"))];
        assert!(set_properties(VertexId(1), &props).is_some());
    }

    #[test]
    fn restored_discriminator_sets_the_type_label() {
        let props = vec![
            (NODE_TYPE.to_string(), PropertyValue::from("pserver")),
            ("aai-uri".to_string(), PropertyValue::from("7dummy")),
        ];
        let cypher = set_properties_cypher(&props).unwrap();
        assert_eq!(
            cypher,
            "MATCH (n) WHERE id(n) = $id SET n.`aai-node-type` = $p0, n.`aai-uri` = $p1, n:`pserver`"
        );

        let props = vec![("aai-uri".to_string(), PropertyValue::from("7dummy"))];
        assert!(!set_properties_cypher(&props).unwrap().contains("n:"));
    }
}
