//! Query Service Seam

use crate::query::Query;
use crate::table::Table;
use crate::TabularError;
use async_trait::async_trait;
use std::sync::Arc;

/// Executes typed queries and returns column-typed tables.
///
/// Implementations must produce a header matching [`Query::header`].
#[async_trait]
pub trait QueryService: Send + Sync {
    async fn execute(&self, query: &Query) -> Result<Table, TabularError>;
}

#[async_trait]
impl<S: QueryService + ?Sized> QueryService for Arc<S> {
    async fn execute(&self, query: &Query) -> Result<Table, TabularError> {
        (**self).execute(query).await
    }
}
