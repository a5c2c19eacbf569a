use anyhow::Result;
use async_trait::async_trait;
use extract::EntityType;
use ingest::SourceType;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

use crate::graph_store::{ConnectedEntity, DocumentRef, EntitySummary, GraphBackend};

#[derive(Debug, Clone)]
enum Node {
    Entity {
        name: String,
        entity_type: EntityType,
        description: String,
        #[allow(dead_code)]
        source: String,
    },
    Document {
        source: String,
        source_type: SourceType,
        #[allow(dead_code)]
        timestamp: i64,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Edge {
    Mentions,
    Related { relation: String },
}

#[derive(Default)]
struct GraphState {
    graph: DiGraph<Node, Edge>,
    entities: HashMap<String, NodeIndex>,
    documents: HashMap<String, NodeIndex>,
}

impl GraphState {
    fn summary(&self, idx: NodeIndex) -> Option<EntitySummary> {
        match &self.graph[idx] {
            Node::Entity {
                name,
                entity_type,
                description,
                ..
            } => Some(EntitySummary {
                name: name.clone(),
                entity_type: *entity_type,
                description: description.clone(),
            }),
            Node::Document { .. } => None,
        }
    }

    fn name(&self, idx: NodeIndex) -> String {
        match &self.graph[idx] {
            Node::Entity { name, .. } => name.clone(),
            Node::Document { source, .. } => source.clone(),
        }
    }

    /// Entities one RELATED_TO hop away, ignoring edge direction.
    fn related_neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        let outgoing = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| matches!(e.weight(), Edge::Related { .. }))
            .map(|e| e.target());
        let incoming = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| matches!(e.weight(), Edge::Related { .. }))
            .map(|e| e.source());
        outgoing.chain(incoming)
    }

    fn has_edge(&self, from: NodeIndex, to: NodeIndex, edge: &Edge) -> bool {
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .any(|e| e.target() == to && e.weight() == edge)
    }

    fn merge_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: Edge) {
        if !self.has_edge(from, to, &edge) {
            self.graph.add_edge(from, to, edge);
        }
    }
}

/// Graph held in process memory, for local runs and tests.
#[derive(Default)]
pub struct InMemoryGraph {
    state: RwLock<GraphState>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphBackend for InMemoryGraph {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        description: &str,
        source: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        match state.entities.get(name).copied() {
            Some(idx) if !description.is_empty() => {
                if let Node::Entity {
                    description: existing,
                    ..
                } = &mut state.graph[idx]
                {
                    *existing = description.to_string();
                }
            }
            Some(_) => {}
            None => {
                let idx = state.graph.add_node(Node::Entity {
                    name: name.to_string(),
                    entity_type,
                    description: description.to_string(),
                    source: source.to_string(),
                });
                state.entities.insert(name.to_string(), idx);
            }
        }

        Ok(())
    }

    async fn upsert_document(
        &self,
        source: &str,
        source_type: SourceType,
        timestamp: i64,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if !state.documents.contains_key(source) {
            let idx = state.graph.add_node(Node::Document {
                source: source.to_string(),
                source_type,
                timestamp,
            });
            state.documents.insert(source.to_string(), idx);
        }

        Ok(())
    }

    async fn merge_mention(&self, doc_source: &str, entity_name: &str) -> Result<bool> {
        let mut state = self.state.write().await;

        let (Some(doc), Some(entity)) = (
            state.documents.get(doc_source).copied(),
            state.entities.get(entity_name).copied(),
        ) else {
            return Ok(false);
        };

        state.merge_edge(doc, entity, Edge::Mentions);
        Ok(true)
    }

    async fn merge_relation(&self, from: &str, to: &str, relation: &str) -> Result<bool> {
        let mut state = self.state.write().await;

        let (Some(a), Some(b)) = (
            state.entities.get(from).copied(),
            state.entities.get(to).copied(),
        ) else {
            return Ok(false);
        };

        state.merge_edge(
            a,
            b,
            Edge::Related {
                relation: relation.to_string(),
            },
        );
        Ok(true)
    }

    async fn related_entities(
        &self,
        name: &str,
        depth: usize,
        limit: usize,
    ) -> Result<Vec<EntitySummary>> {
        let state = self.state.read().await;
        let Some(start) = state.entities.get(name).copied() else {
            return Ok(Vec::new());
        };

        // Breadth-first, nearest entities first
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut related = Vec::new();

        while let Some((idx, hops)) = queue.pop_front() {
            if hops == depth {
                continue;
            }
            for next in state.related_neighbors(idx) {
                if !seen.insert(next) {
                    continue;
                }
                if related.len() == limit {
                    return Ok(related);
                }
                if let Some(summary) = state.summary(next) {
                    related.push(summary);
                }
                queue.push_back((next, hops + 1));
            }
        }

        Ok(related)
    }

    async fn shortest_path(&self, from: &str, to: &str, max_depth: usize) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let (Some(start), Some(goal)) = (
            state.entities.get(from).copied(),
            state.entities.get(to).copied(),
        ) else {
            return Ok(Vec::new());
        };
        if start == goal {
            return Ok(Vec::new());
        }

        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut seen = HashSet::from([start]);

        while let Some((idx, hops)) = queue.pop_front() {
            if hops == max_depth {
                continue;
            }
            for next in state.related_neighbors(idx) {
                if !seen.insert(next) {
                    continue;
                }
                parents.insert(next, idx);

                if next == goal {
                    let mut path = vec![state.name(goal)];
                    let mut cursor = goal;
                    while let Some(&parent) = parents.get(&cursor) {
                        path.push(state.name(parent));
                        cursor = parent;
                    }
                    path.reverse();
                    return Ok(path);
                }

                queue.push_back((next, hops + 1));
            }
        }

        Ok(Vec::new())
    }

    async fn documents_for_entity(&self, name: &str, limit: usize) -> Result<Vec<DocumentRef>> {
        let state = self.state.read().await;
        let Some(entity) = state.entities.get(name).copied() else {
            return Ok(Vec::new());
        };

        let documents = state
            .graph
            .edges_directed(entity, Direction::Incoming)
            .filter(|e| *e.weight() == Edge::Mentions)
            .filter_map(|e| match &state.graph[e.source()] {
                Node::Document {
                    source,
                    source_type,
                    ..
                } => Some(DocumentRef {
                    source: source.clone(),
                    source_type: *source_type,
                }),
                Node::Entity { .. } => None,
            })
            .take(limit)
            .collect();

        Ok(documents)
    }

    async fn most_connected(&self, limit: usize) -> Result<Vec<ConnectedEntity>> {
        let state = self.state.read().await;

        let mut ranked: Vec<ConnectedEntity> = state
            .graph
            .node_indices()
            .filter_map(|idx| {
                let connections = state.graph.edges_directed(idx, Direction::Outgoing).count()
                    + state.graph.edges_directed(idx, Direction::Incoming).count();
                match &state.graph[idx] {
                    Node::Entity {
                        name, entity_type, ..
                    } if connections > 0 => Some(ConnectedEntity {
                        name: name.clone(),
                        entity_type: *entity_type,
                        connections,
                    }),
                    _ => None,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.connections
                .cmp(&a.connections)
                .then_with(|| a.name.cmp(&b.name))
        });
        ranked.truncate(limit);

        Ok(ranked)
    }

    async fn search_entities(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<EntitySummary>> {
        let state = self.state.read().await;

        let matches = state
            .graph
            .node_indices()
            .filter_map(|idx| state.summary(idx))
            .filter(|e| e.name.contains(query))
            .filter(|e| entity_type.is_none_or(|t| e.entity_type == t))
            .take(limit)
            .collect();

        Ok(matches)
    }

    async fn entity_count(&self) -> Result<usize> {
        Ok(self.state.read().await.entities.len())
    }

    async fn relation_count(&self) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .graph
            .edge_weights()
            .filter(|e| matches!(e, Edge::Related { .. }))
            .count())
    }
}
