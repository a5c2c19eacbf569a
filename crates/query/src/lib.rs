//! Query side of the knowledge base.
//!
//! [`Brain`] ingests content and answers questions; [`IdeaEngine`] explores
//! the entity graph and proposes ideas along its paths.

pub mod brain;
pub mod idea_parser;
pub mod ideas;
pub mod prompts;

pub use brain::{Brain, DEFAULT_TOP_K, KnowledgeStats, SearchResult};
pub use idea_parser::{ParsedIdea, parse_idea_reply};
pub use ideas::{Connection, Exploration, GraphStats, Idea, IdeaEngine, render_connections};
