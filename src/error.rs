// src/error.rs

//! Typed errors for host-tree queries. None of them are fatal to the engine:
//! the scanner logs and skips the element concerned.

use crate::tree::{ColorAttribute, ElementId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("element {0:?} is not attached to the tree")]
    Detached(ElementId),
    #[error("could not resolve {attr:?} on element {id:?}: {reason}")]
    Unresolvable {
        id: ElementId,
        attr: ColorAttribute,
        reason: String,
    },
    #[error("could not measure element {0:?}")]
    Unmeasurable(ElementId),
    #[error("element {id:?} rejected a {attr:?} override")]
    WriteRejected { id: ElementId, attr: ColorAttribute },
}
