mod openai;
mod traits;

pub use openai::OpenAiGateway;
pub use traits::*;
