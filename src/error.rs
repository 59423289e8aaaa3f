use thiserror::Error;

use crate::link::LinkError;
use crate::resolver::ResolveError;
use crate::transfer::TransferError;

/// Everything that can go wrong between pasting a link and finishing a
/// transfer. A user cancellation is not an error; it surfaces as
/// [`TransferOutcome::Cancelled`](crate::transfer::TransferOutcome::Cancelled).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] LinkError),
    #[error(transparent)]
    Resolution(#[from] ResolveError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

pub type Result<T> = std::result::Result<T, Error>;
