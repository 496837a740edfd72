pub mod block_outline;

pub use block_outline::{BlockOutlineModel, OutlineNode, StyleSpan, TokenKind};
