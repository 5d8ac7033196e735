//! # catalog CLI
//!
//! Command-line interface for the media catalog.
//!
//! ## Usage
//! ```bash
//! catalog sync ~/Pictures
//! catalog duplicates --by perceptual --output json
//! catalog stats
//! ```

mod cli;

use media_catalog::Result;

fn main() -> Result<()> {
    cli::run()
}
