/// Persistence layer: one PgPool shared by the catalog loader, the arm
/// store, the feedback store, and (via `retrieval::vector`/`retrieval::llm`)
/// the retrieval channels — all backed by the same connection pool.

pub mod postgres;

pub use postgres::PostgresStore;
