//! Database repositories for the file storage engine
//!
//! Each logical file lives in exactly one of `audio_files`, `image_files` or
//! `video_files`; `file_index` maps id to kind so lookups never scan all three.
//! Chunk rows reference `file_index` and cascade with it.
//
// Repository contracts
pub mod repository;
//
// PostgreSQL implementations
pub mod chunk;
pub mod file;
//
// In-memory implementations (development and tests)
pub mod memory;
//
// Pool, migrations and repository selection
pub mod setup;

pub use chunk::PostgresChunkRepository;
pub use file::PostgresFileRepository;
pub use memory::{MemoryChunkRepository, MemoryFileRepository};
pub use repository::{ChunkRepository, ExpiredSession, FileRepository, Repositories};
pub use setup::{create_repositories, setup_database};
