//! PDFium library discovery.
//!
//! Each blocking operation binds its own `Pdfium` handle; the OS caches the
//! `dlopen`, so repeat binds are cheap.
//!
//! Discovery order:
//! 1. `PDFIUM_LIB_PATH` (explicit path to the library file)
//! 2. Alongside the running executable
//! 3. System library search paths

use crate::error::RtwError;
use pdfium_render::prelude::*;
use tracing::debug;

/// Bind to a PDFium library.
pub(crate) fn load_pdfium() -> Result<Pdfium, RtwError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.trim().is_empty() {
            debug!(path = %path, "Loading PDFium from PDFIUM_LIB_PATH");
            let bindings = Pdfium::bind_to_library(&path)
                .map_err(|e| RtwError::PdfiumUnavailable(format!("{path}: {e}")))?;
            return Ok(Pdfium::new(bindings));
        }
    }

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %dir.display(), "Loaded PDFium next to the executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| RtwError::PdfiumUnavailable(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

/// `true` when some PDFium library can be bound.
pub fn pdfium_available() -> bool {
    load_pdfium().is_ok()
}

/// Map a document load error, singling out encrypted documents.
pub(crate) fn map_load_error(e: PdfiumError) -> RtwError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        RtwError::PasswordRequired
    } else {
        RtwError::PdfLoad { detail: msg }
    }
}
