//! Permission evaluation and caching
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         PermissionService                            │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────┐ ┌─────────────────┐ │
//! │  │  Registry   │ │  Evaluator  │ │    Cache    │ │     Audit       │ │
//! │  │             │ │             │ │             │ │                 │ │
//! │  │ - Memory    │ │ - super-role│ │ - snapshot  │ │ - File (JSONL)  │ │
//! │  │ - File      │ │ - `*`       │ │ - epochs    │ │ - Memory        │ │
//! │  │ - ReadOnly  │ │ - exact     │ │ - tickets   │ │ - Null          │ │
//! │  │             │ │ - `module:*`│ │             │ │ - Composite     │ │
//! │  └─────────────┘ └─────────────┘ └─────────────┘ └─────────────────┘ │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use warden_engine::permission::Presets;
//!
//! // Testing: seeded roles, in-memory audit
//! let service = Presets::testing().build()?;
//!
//! // Roles under ~/.config/myapp
//! let service = Presets::file_backed("myapp")?.build()?;
//! ```
//!
//! # Permission strings
//!
//! | Form | Grants |
//! |------|--------|
//! | `*` | everything |
//! | `cases:*` | every check in `cases` |
//! | `cases:read` | exactly that |
//! | `personnel:read:self` | exactly that |
//!
//! Checks that name only a module ask for `module:read`.

pub mod cache;
pub mod evaluator;
pub mod presets;

pub use cache::{CacheState, LoadTicket, PermissionCache, ResolvedPermissions};
pub use evaluator::{candidate_for, has_permission, match_grant};
pub use evaluator::{Decision, DenyReason, Evaluator, Grant};
pub use presets::{PermissionServiceBuilder, PresetError, Presets};
