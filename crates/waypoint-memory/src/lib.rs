pub mod embedding_provider;
pub mod episode_store;
pub mod errors;
pub mod reflection;

pub use embedding_provider::{cosine_similarity, EmbeddingProvider};
pub use episode_store::EpisodeStore;
pub use errors::{MemoryError, MemoryResult};
pub use reflection::{reflect_on_episode, ReflectionGenerator, ReflectionInput};
