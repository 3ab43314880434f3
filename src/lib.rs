//! Re-linearize JVM-style method bodies
//!
//! Obfuscated method bodies tend to be a soup of blocks glued together with `goto`s and overlapping
//! exception ranges. This crate takes the control flow graph of such a method (see
//! [`jvm::code`]), picks a new order for its blocks so that as many jumps as possible turn into
//! plain fallthrough (see [`linearize`]), and rebuilds an exception table that is valid for that
//! new order. The [`listing`] module provides a small textual front-end so that method bodies can
//! be fed in and printed back out.
//!
//! ```
//! use unknot::linearize::{BatchReport, Linearizer, Settings};
//! use unknot::listing;
//!
//! # fn main() -> Result<(), listing::Error> {
//! let mut class = listing::parse_class(
//!     r#"
//! .class me/alec/Demo
//! .method run()V
//!     goto L2
//! L1:
//!     return
//! L2:
//!     goto L1
//! .end method
//! "#,
//! )?;
//!
//! let mut report = BatchReport::default();
//! Linearizer::new(Settings::new()).run_class(&mut class, &mut report);
//! assert_eq!(report.jumps_eliminated, 2);
//! # Ok(())
//! # }
//! ```

pub mod jvm;
pub mod linearize;
pub mod listing;
mod util;
