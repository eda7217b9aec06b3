//! Async Rust driver for the Quill document database HTTP API.
//!
//! # Driver overview
//! ### Connecting
//! All driver activity revolves around the [`Session`], created with a
//! [`SessionBuilder`]:
//!
//! ```rust,no_run
//! use quill::{Session, SessionBuilder};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session: Session = SessionBuilder::new("my-secret")
//!     .endpoint("http://localhost:8443")
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Making queries
//! Queries are built from a template with `${name}` placeholders and a
//! map of argument values, then executed through the session:
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use quill::{Query, Session};
//!
//! # async fn example(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
//! let mut args = HashMap::new();
//! args.insert("email".to_owned(), "ada@example.com".into());
//! let query = Query::from_template("users.byEmail(${email})", &args)?;
//!
//! let result = session.query(&query).await?;
//! println!("{}", result.data);
//! # Ok(())
//! # }
//! ```
//!
//! Failed queries surface as a typed
//! [`ServiceError`](crate::errors::ServiceError); throttled requests are
//! retried with jittered exponential backoff before one does.
//!
//! ### Paginated queries
//! A query over a set yields pages; [`Session::paginate`] walks them:
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use quill::{Query, Session};
//!
//! # async fn example(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
//! let query = Query::from_template("users.all()", &HashMap::new())?;
//! let mut pager = session.paginate(query);
//! while pager.has_next() {
//!     let page = pager.next_page().await?;
//!     println!("{} items", page.data.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod errors;
pub mod network;
pub mod policies;
pub mod response;
pub mod statement;

pub use client::pager::QueryPager;
pub use client::session::Session;
pub use client::session_builder::SessionBuilder;
pub use policies::retry::RetryConfig;
pub use response::{Page, QuerySuccess};
pub use statement::Query;
