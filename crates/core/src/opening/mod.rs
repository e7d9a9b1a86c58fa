//! Opening book lookups against a remote opening explorer

use std::future::Future;
use std::sync::Arc;

pub mod cache;
pub mod client;
pub mod rate_limit;
pub mod selection;
pub mod types;

pub use client::{ExplorerTransport, HttpExplorer, OpeningBookClient};
pub use selection::SelectionStrategy;
pub use types::{BookData, BookStats, CandidateMove, OpeningDatabase, OpeningInfo, TopMove};

use crate::engine::Evaluation;

/// A source of opening statistics for positions given as FEN
pub trait OpeningSource: Send + Sync {
    /// Database lookups go to unless told otherwise
    fn active_database(&self) -> OpeningDatabase;

    /// Book data for a position; `None` means no usable data
    fn lookup(
        &self,
        fen: &str,
        database: OpeningDatabase,
    ) -> impl Future<Output = Option<BookData>> + Send;

    /// Evaluation implied by the book, if it holds enough games
    fn book_evaluation(&self, book: &BookData) -> Option<Evaluation>;
}

impl<T: ExplorerTransport> OpeningSource for OpeningBookClient<T> {
    fn active_database(&self) -> OpeningDatabase {
        self.database()
    }

    async fn lookup(&self, fen: &str, database: OpeningDatabase) -> Option<BookData> {
        self.query(fen, database).await
    }

    fn book_evaluation(&self, book: &BookData) -> Option<Evaluation> {
        self.calculate_opening_evaluation(book)
    }
}

impl<S: OpeningSource> OpeningSource for Arc<S> {
    fn active_database(&self) -> OpeningDatabase {
        (**self).active_database()
    }

    fn lookup(
        &self,
        fen: &str,
        database: OpeningDatabase,
    ) -> impl Future<Output = Option<BookData>> + Send {
        (**self).lookup(fen, database)
    }

    fn book_evaluation(&self, book: &BookData) -> Option<Evaluation> {
        (**self).book_evaluation(book)
    }
}
