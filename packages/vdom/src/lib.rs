pub mod address;
pub mod attrs;
pub mod bindings;
pub mod diff;
pub mod engine;
pub mod errors;
pub mod html;
pub mod markup;
pub mod morph;
pub mod mutator;
pub mod node;
pub mod patch;
pub mod resolver;
pub mod tree;

#[cfg(test)]
mod tests_engine;

#[cfg(test)]
mod tests_morph;

pub use address::Address;
pub use bindings::{BindingTable, HandlerDescriptor, RescanStats};
pub use diff::diff;
pub use engine::{ApplyReport, PatchEngine, PatchFailure, DEFAULT_BLOCK_INSERT_MIN};
pub use errors::{MarkupError, PatchError, ResolveError};
pub use html::{render, render_live};
pub use markup::{decode_entities, parse_fragment, parse_markup};
pub use morph::{morph, MorphOptions, MorphStats};
pub use node::{Attributes, VNode};
pub use patch::{Patch, Phase};
pub use resolver::{path_of, resolve, resolve_path, significant_children};
pub use tree::{LiveTree, NodeId, NodeKind};
