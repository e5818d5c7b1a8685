//! # bunkatsu_graph
//!
//! Module dependency graph for the bunkatsu chunking engine.
//!
//! This crate provides:
//! - [`Module`], [`ModuleId`] and [`Origin`], the immutable graph nodes
//! - The [`Resolver`] seam that maps import specifiers to modules
//! - [`GraphBuilder`], which walks every entry's transitive imports
//! - [`MemoryResolver`], an in-memory resolver for tests and embedding
//!
//! ## Example
//!
//! ```rust
//! use bunkatsu_graph::{EntryDecl, GraphBuilder, MemoryResolver, Origin};
//!
//! let resolver = MemoryResolver::new()
//!     .module("src/index.ts", Origin::Application, 120, &["src/app.ts"])
//!     .module("src/app.ts", Origin::Application, 80, &["src/index.ts"]);
//!
//! let graph = GraphBuilder::new(&resolver)
//!     .build(&[EntryDecl::new("main", ["src/index.ts"])])
//!     .unwrap();
//!
//! assert_eq!(graph.len(), 2);
//! ```

mod entry;
mod error;
mod graph;
mod memory;
mod module;
mod resolver;

pub use entry::{Entry, EntryDecl};
pub use error::GraphError;
pub use graph::{GraphBuilder, ModuleGraph};
pub use memory::MemoryResolver;
pub use module::{Module, ModuleId, Origin};
pub use resolver::{ModuleSource, ResolveError, Resolved, Resolver};
