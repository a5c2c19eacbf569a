use extract::{EntityType, GenerateOptions, TextGenerator};
use index::{ConnectedEntity, DEFAULT_PATH_DEPTH, DocumentRef, EntitySummary, KnowledgeGraph};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::idea_parser::parse_idea_reply;
use crate::prompts;

const EXPLORE_RELATED_LIMIT: usize = 15;
const EXPLORE_DOCUMENT_LIMIT: usize = 5;
const IDEA_CANDIDATES: usize = 2;
const IDEA_POOL_LIMIT: usize = 10;
const IDEA_MAX_TOKENS: u32 = 300;
const RENDER_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Exploration {
    Found {
        entity: EntitySummary,
        related: Vec<EntitySummary>,
        documents: Vec<DocumentRef>,
    },
    NotFound {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Connection {
    /// `distance` counts edges, so it is `path.len() - 1`
    Connected { path: Vec<String>, distance: usize },
    /// `path` is always empty
    NotConnected {
        #[serde(default)]
        path: Vec<String>,
        entity1_found: bool,
        entity2_found: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    pub path: Vec<String>,
    pub idea: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
    pub most_connected: Vec<ConnectedEntity>,
}

/// Graph exploration and idea generation over a [`KnowledgeGraph`].
pub struct IdeaEngine {
    graph: KnowledgeGraph,
    llm: Arc<dyn TextGenerator>,
    rng: Mutex<StdRng>,
}

impl IdeaEngine {
    pub fn new(graph: KnowledgeGraph, llm: Arc<dyn TextGenerator>) -> Self {
        Self {
            graph,
            llm,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible target sampling.
    pub fn with_seed(graph: KnowledgeGraph, llm: Arc<dyn TextGenerator>, seed: u64) -> Self {
        Self {
            graph,
            llm,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub async fn graph_stats(&self) -> GraphStats {
        GraphStats {
            entity_count: self.graph.get_entity_count().await,
            relation_count: self.graph.get_relation_count().await,
            most_connected: self.graph.get_most_connected(5).await,
        }
    }

    /// The first entity whose name contains `name`, with its neighbourhood.
    pub async fn explore_entity(&self, name: &str) -> Exploration {
        let Some(entity) = self
            .graph
            .search_entities(name, None, 1)
            .await
            .into_iter()
            .next()
        else {
            return Exploration::NotFound {
                name: name.to_string(),
            };
        };

        let related = self
            .graph
            .get_related_entities(&entity.name, 2, EXPLORE_RELATED_LIMIT)
            .await;
        let documents = self
            .graph
            .get_documents_for_entity(&entity.name, EXPLORE_DOCUMENT_LIMIT)
            .await;

        Exploration::Found {
            entity,
            related,
            documents,
        }
    }

    pub async fn find_connections(&self, entity1: &str, entity2: &str) -> Connection {
        let path = self
            .graph
            .find_path(entity1, entity2, DEFAULT_PATH_DEPTH)
            .await;

        if !path.is_empty() {
            return Connection::Connected {
                distance: path.len() - 1,
                path,
            };
        }

        Connection::NotConnected {
            path: Vec::new(),
            entity1_found: !self.graph.search_entities(entity1, None, 1).await.is_empty(),
            entity2_found: !self.graph.search_entities(entity2, None, 1).await.is_empty(),
        }
    }

    /// Up to `count` ideas linking entities matching `topic` to their
    /// neighbourhood. Fewer come back when the graph has too few
    /// connections.
    pub async fn generate_ideas(&self, topic: &str, count: usize) -> Vec<Idea> {
        let mut ideas = Vec::new();
        if count == 0 {
            return ideas;
        }

        let matches = self.graph.search_entities(topic, None, 5).await;
        if matches.is_empty() {
            info!(topic = %topic, "No matching entities for topic");
            return ideas;
        }

        for candidate in matches.iter().take(IDEA_CANDIDATES) {
            let related = self
                .graph
                .get_related_entities(&candidate.name, 2, IDEA_POOL_LIMIT)
                .await;
            if related.is_empty() {
                continue;
            }

            let targets = self.sample(&related, count);

            for target in targets {
                let found = self
                    .graph
                    .find_path(&candidate.name, &target.name, DEFAULT_PATH_DEPTH)
                    .await;
                let path = if found.len() > 2 {
                    found
                } else {
                    vec![candidate.name.clone(), target.name.clone()]
                };

                if let Some(idea) = self.generate_single_idea(path).await {
                    ideas.push(idea);
                }
                if ideas.len() >= count {
                    break;
                }
            }

            if ideas.len() >= count {
                break;
            }
        }

        ideas.truncate(count);
        debug!(topic = %topic, ideas = ideas.len(), "Generated ideas");
        ideas
    }

    fn sample(&self, pool: &[EntitySummary], count: usize) -> Vec<EntitySummary> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pool.choose_multiple(&mut *rng, count.min(pool.len()))
            .cloned()
            .collect()
    }

    async fn generate_single_idea(&self, path: Vec<String>) -> Option<Idea> {
        let prompt = prompts::build_idea_prompt(&path.join(" → "));
        let options = GenerateOptions::default().with_max_tokens(IDEA_MAX_TOKENS);

        match self.llm.generate(&prompt, &options).await {
            Ok(reply) => {
                let parsed = parse_idea_reply(&reply);
                Some(Idea {
                    path,
                    idea: parsed.idea,
                    explanation: parsed.explanation,
                })
            }
            Err(e) => {
                error!(error = %e, "Failed to generate idea");
                None
            }
        }
    }
}

pub fn type_marker(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Person => "👤",
        EntityType::Org => "🏢",
        EntityType::Technology => "⚙️",
        EntityType::Concept => "💡",
        EntityType::Location => "📍",
        EntityType::Date => "📅",
    }
}

/// ASCII tree of an entity and up to ten of its neighbours.
pub fn render_connections(name: &str, related: &[EntitySummary]) -> String {
    if related.is_empty() {
        return format!("  [{}] (no connections)", name);
    }

    let mut lines = vec![format!("  [{}]", name), "       │".to_string()];

    for (i, entity) in related.iter().take(RENDER_LIMIT).enumerate() {
        let branch = if i + 1 < related.len() { "├──" } else { "└──" };
        lines.push(format!(
            "       {} {} {}",
            branch,
            type_marker(entity.entity_type),
            entity.name
        ));
    }

    if related.len() > RENDER_LIMIT {
        lines.push(format!("       └── ... and {} more", related.len() - RENDER_LIMIT));
    }

    lines.join("\n")
}
