use axum::extract::State;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use folio_db::models::BookRow;
use folio_types::api::{BookResponse, CreateBookRequest};

use crate::caller::Caller;
use crate::error::{ActionResult, CreatedResult, blocking, created, ok};
use crate::extract::{Params, Payload};
use crate::state::AppState;
use crate::validate;

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    Payload(req): Payload<CreateBookRequest>,
) -> CreatedResult<BookResponse> {
    caller.require_active()?;
    validate::book(&req.title, &req.author)?;

    let db = state.db.clone();
    let user_id = caller.id();
    let book = blocking(move || {
        db.create_book(Uuid::new_v4(), req.title.trim(), req.author.trim(), user_id)
    })
    .await?;

    info!("{} added book {} ({})", caller.user.username, book.title, book.id);
    created(to_response(book))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<u32>,
}

/// Case-insensitive title search; without a query every book is listed by title.
pub async fn search(
    State(state): State<AppState>,
    _caller: Caller,
    Params(query): Params<SearchQuery>,
) -> ActionResult<Vec<BookResponse>> {
    let limit = validate::limit(query.limit, 20, 100)?;
    let db = state.db.clone();
    let books = blocking(move || {
        let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
        db.search_books(q, limit)
    })
    .await?;
    ok(books.into_iter().map(to_response).collect())
}

fn to_response(book: BookRow) -> BookResponse {
    BookResponse {
        id: book.id,
        title: book.title,
        author: book.author,
        added_by: book.added_by,
        created_at: book.created_at,
    }
}
