//! Text processing: document chunking and PDF extraction

pub mod chunking;
pub mod extract;

pub use chunking::chunk_text;
pub use extract::extract_pdf_text;
