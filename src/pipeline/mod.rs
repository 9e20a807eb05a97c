pub mod answer;
pub mod prompts;

pub use answer::AnswerPipeline;
