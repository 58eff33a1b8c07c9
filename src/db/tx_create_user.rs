//! User creation with a pre-commit side effect
//!
//! `after_create` runs inside the transaction, after the user row is written
//! and before commit. If it fails the user row is rolled back. Anything it
//! schedules elsewhere (a task on the broker) can still be observed before
//! the commit lands, so such work must be scheduled with a processing delay.

use std::future::Future;

use futures::future::BoxFuture;

use super::error::{CallbackError, StoreError, StoreResult};
use super::models::User;
use super::queries::{CreateUserParams, Queries};

/// Async callback invoked with the freshly inserted user
pub type AfterCreate =
    Box<dyn FnOnce(User) -> BoxFuture<'static, Result<(), CallbackError>> + Send>;

/// Boxes an async closure into an [`AfterCreate`]
pub fn after_create<F, Fut>(f: F) -> AfterCreate
where
    F: FnOnce(User) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    Box::new(move |user: User| -> BoxFuture<'static, Result<(), CallbackError>> {
        Box::pin(f(user))
    })
}

pub struct CreateUserTxParams {
    pub params: CreateUserParams,
    pub after_create: AfterCreate,
}

impl CreateUserTxParams {
    pub fn new(params: CreateUserParams, after_create: AfterCreate) -> Self {
        Self {
            params,
            after_create,
        }
    }

    /// No side effect after creation
    pub fn without_callback(params: CreateUserParams) -> Self {
        Self::new(params, after_create(|_| async { Ok::<(), CallbackError>(()) }))
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserTxResult {
    pub user: User,
}

pub(crate) async fn create_user(
    q: &mut dyn Queries,
    arg: CreateUserTxParams,
) -> StoreResult<CreateUserTxResult> {
    let user = q.create_user(arg.params).await?;

    (arg.after_create)(user.clone())
        .await
        .map_err(StoreError::Callback)?;

    Ok(CreateUserTxResult { user })
}
