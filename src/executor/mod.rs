pub mod submit;
pub mod text_input;
