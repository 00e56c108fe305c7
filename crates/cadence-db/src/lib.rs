//! Cadence persistence layer
//!
//! Repository traits for file records and chunk bookkeeping, with PostgreSQL
//! and in-memory implementations.

pub mod db;

pub use db::{
    create_repositories, setup_database, ChunkRepository, ExpiredSession, FileRepository,
    MemoryChunkRepository, MemoryFileRepository, PostgresChunkRepository,
    PostgresFileRepository, Repositories,
};
