//! Check command implementation

use cpldupdate_core::image::load_image;
use cpldupdate_core::protocol::PAGE_SIZE;
use std::path::Path;

/// Validate an update image, optionally writing it back in canonical form
pub fn run_check(image: &Path, normalize: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = load_image(image)?;

    println!(
        "{:?}: CFG {} bytes ({} pages), UFM {} bytes ({} pages)",
        image,
        parsed.cfg().len(),
        parsed.cfg().len() / PAGE_SIZE,
        parsed.ufm().len(),
        parsed.ufm().len() / PAGE_SIZE
    );

    if let Some(out) = normalize {
        std::fs::write(out, parsed.to_hex())?;
        println!("Wrote canonical image to {:?}", out);
    }

    Ok(())
}
