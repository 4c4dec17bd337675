pub mod extract;
pub mod gemini;
pub mod prompt;
