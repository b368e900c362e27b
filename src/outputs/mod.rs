//! Output writers for collected reviews.
//!
//! ```text
//! json_output_dir/
//! └── 1234567/
//!     ├── booking.json
//!     ├── blog.json
//!     └── receipt.json
//! ```

pub mod json;
