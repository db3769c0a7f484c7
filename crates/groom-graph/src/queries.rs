//! Read operations against the property graph.
//!
//! Vertices are addressed by Neo4j's internal id. The node type lives in the
//! `aai-node-type` property and, where the loader set one, in a label of the
//! same name. Key lookups filter on the property; type enumeration also
//! accepts the label, which survives loss of the property.

use std::collections::BTreeSet;

use groom_core::access::KeyValues;
use groom_core::types::{
    Direction, Edge, EdgeId, EdgeMarker, Properties, PropertyValue, Vertex, VertexId,
    CONTAINS_OTHER_V, DELETE_OTHER_V, NODE_TYPE,
};
use neo4rs::{query, Query};

use crate::client::{ClientError, GraphClient};

const EDGE_COLUMNS: &str = "id(r) AS rid, type(r) AS label, \
     id(startNode(r)) AS out_id, id(endNode(r)) AS in_id, \
     r.`contains-other-v` AS contains, r.`delete-other-v` AS cascade";

impl GraphClient {
    // ── Vertices ─────────────────────────────────────────────────

    /// Fetch a vertex with its full property bag.
    pub async fn fetch_vertex(&self, id: VertexId) -> Result<Option<Vertex>, ClientError> {
        let q = query("MATCH (n) WHERE id(n) = $id RETURN n, keys(n) AS keys").param("id", id.0);

        let Some(row) = self.query_one(q).await? else {
            return Ok(None);
        };
        let node: neo4rs::Node = row
            .get("n")
            .map_err(|e| ClientError::Decode(format!("vertex {id}: {e}")))?;
        let keys: Vec<String> = row.get("keys").unwrap_or_default();

        let mut properties = Properties::new();
        for key in keys {
            if let Some(value) = read_property(&node, &key) {
                properties.insert(key, value);
            }
        }
        Ok(Some(Vertex { id, properties }))
    }

    /// Vertices filed under `node_type` by property or by label.
    pub async fn fetch_ids_of_type(&self, node_type: &str) -> Result<Vec<VertexId>, ClientError> {
        let q = query(&ids_of_type_cypher()).param("node_type", node_type.to_string());
        self.collect_vertex_ids(q).await
    }

    pub async fn fetch_by_keys(
        &self,
        node_type: &str,
        keys: &KeyValues,
    ) -> Result<Vec<VertexId>, ClientError> {
        let mut cypher = format!("MATCH (n) WHERE n.{} = $node_type", quote(NODE_TYPE));
        for (i, (name, _)) in keys.iter().enumerate() {
            cypher.push_str(&format!(" AND n.{} = $k{i}", quote(name)));
        }
        cypher.push_str(" RETURN id(n) AS id ORDER BY id");

        let q = bind_keys(
            query(&cypher).param("node_type", node_type.to_string()),
            keys,
        );
        self.collect_vertex_ids(q).await
    }

    pub async fn fetch_children_by_keys(
        &self,
        parent: VertexId,
        node_type: &str,
        keys: &KeyValues,
    ) -> Result<Vec<VertexId>, ClientError> {
        let mut cypher = format!(
            "MATCH (p)-[r]-(c) WHERE id(p) = $pid AND c.{nt} = $node_type \
             AND ((startNode(r) = p AND r.{co} = 'OUT') OR (endNode(r) = p AND r.{co} = 'IN'))",
            nt = quote(NODE_TYPE),
            co = quote(CONTAINS_OTHER_V),
        );
        for (i, (name, _)) in keys.iter().enumerate() {
            cypher.push_str(&format!(" AND c.{} = $k{i}", quote(name)));
        }
        cypher.push_str(" RETURN DISTINCT id(c) AS id ORDER BY id");

        let q = bind_keys(
            query(&cypher)
                .param("pid", parent.0)
                .param("node_type", node_type.to_string()),
            keys,
        );
        self.collect_vertex_ids(q).await
    }

    pub async fn fetch_neighbor_ids(
        &self,
        id: VertexId,
    ) -> Result<BTreeSet<VertexId>, ClientError> {
        let q = query("MATCH (a)--(b) WHERE id(a) = $id RETURN DISTINCT id(b) AS id")
            .param("id", id.0);
        Ok(self.collect_vertex_ids(q).await?.into_iter().collect())
    }

    async fn collect_vertex_ids(&self, q: Query) -> Result<Vec<VertexId>, ClientError> {
        let rows = self.query_rows(q).await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .get("id")
                .map_err(|e| ClientError::Decode(format!("vertex id: {e}")))?;
            ids.push(VertexId(id));
        }
        Ok(ids)
    }

    // ── Edges ────────────────────────────────────────────────────

    pub async fn fetch_incident_edges(
        &self,
        id: VertexId,
        direction: Direction,
    ) -> Result<Vec<Edge>, ClientError> {
        let pattern = match direction {
            Direction::Out => "(a)-[r]->()",
            Direction::In => "(a)<-[r]-()",
            Direction::Both => "(a)-[r]-()",
        };
        let q = query(&format!(
            "MATCH {pattern} WHERE id(a) = $id RETURN DISTINCT {EDGE_COLUMNS}"
        ))
        .param("id", id.0);
        self.collect_edges(q).await
    }

    pub async fn fetch_edge_ids(&self) -> Result<Vec<EdgeId>, ClientError> {
        let rows = self
            .query_rows(query("MATCH ()-[r]->() RETURN id(r) AS id ORDER BY id"))
            .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .get("id")
                .map_err(|e| ClientError::Decode(format!("edge id: {e}")))?;
            ids.push(EdgeId(id));
        }
        Ok(ids)
    }

    pub async fn fetch_edge(&self, id: EdgeId) -> Result<Option<Edge>, ClientError> {
        let q = query(&format!(
            "MATCH ()-[r]->() WHERE id(r) = $id RETURN {EDGE_COLUMNS}"
        ))
        .param("id", id.0);
        Ok(self.collect_edges(q).await?.into_iter().next())
    }

    async fn collect_edges(&self, q: Query) -> Result<Vec<Edge>, ClientError> {
        let rows = self.query_rows(q).await?;
        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let rid: i64 = row
                .get("rid")
                .map_err(|e| ClientError::Decode(format!("edge id: {e}")))?;
            let out_id: i64 = row
                .get("out_id")
                .map_err(|e| ClientError::Decode(format!("edge {rid} out vertex: {e}")))?;
            let in_id: i64 = row
                .get("in_id")
                .map_err(|e| ClientError::Decode(format!("edge {rid} in vertex: {e}")))?;
            let contains: String = row.get("contains").unwrap_or_default();
            let cascade: String = row.get("cascade").unwrap_or_default();

            let mut properties = Properties::new();
            if !contains.is_empty() {
                properties.insert(CONTAINS_OTHER_V.to_string(), PropertyValue::from(contains.as_str()));
            }
            if !cascade.is_empty() {
                properties.insert(DELETE_OTHER_V.to_string(), PropertyValue::from(cascade.as_str()));
            }

            edges.push(Edge {
                id: EdgeId(rid),
                label: row.get("label").unwrap_or_default(),
                out_vertex: VertexId(out_id),
                in_vertex: VertexId(in_id),
                contains_other_v: EdgeMarker::parse(&contains),
                delete_other_v: EdgeMarker::parse(&cascade),
                properties,
            });
        }
        Ok(edges)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn ids_of_type_cypher() -> String {
    format!(
        "MATCH (n) WHERE n.{} = $node_type OR $node_type IN labels(n) \
         RETURN id(n) AS id ORDER BY id",
        quote(NODE_TYPE)
    )
}

/// Backtick-quote a property name for use in Cypher text.
pub(crate) fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Bind a property value as a query parameter.
pub(crate) fn bind(q: Query, name: &str, value: &PropertyValue) -> Query {
    match value {
        PropertyValue::String(s) => q.param(name, s.clone()),
        PropertyValue::Long(v) => q.param(name, *v),
        PropertyValue::Integer(v) => q.param(name, i64::from(*v)),
        PropertyValue::Boolean(v) => q.param(name, *v),
    }
}

fn bind_keys(q: Query, keys: &KeyValues) -> Query {
    keys.iter()
        .enumerate()
        .fold(q, |q, (i, (_, value))| bind(q, &format!("k{i}"), value))
}

/// Read one node property into the tagged value type. Neo4j integers are
/// always 64-bit, so they come back as `Long`.
fn read_property(node: &neo4rs::Node, key: &str) -> Option<PropertyValue> {
    if let Ok(v) = node.get::<i64>(key) {
        return Some(PropertyValue::Long(v));
    }
    if let Ok(v) = node.get::<bool>(key) {
        return Some(PropertyValue::Boolean(v));
    }
    if let Ok(v) = node.get::<String>(key) {
        return Some(PropertyValue::String(v));
    }
    tracing::debug!(key, "Skipping property with unsupported value type");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_backticks() {
        assert_eq!(quote("aai-node-type"), "`aai-node-type`");
        assert_eq!(quote("we`ird"), "`we``ird`");
    }

    #[test]
    fn type_enumeration_accepts_the_label() {
        let cypher = ids_of_type_cypher();
        assert!(cypher.contains("n.`aai-node-type` = $node_type"));
        assert!(cypher.contains("$node_type IN labels(n)"));
    }
}
