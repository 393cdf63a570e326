// Analysis orchestrator: four concurrent inference calls whose JSON replies
// are parsed leniently and combined into one AnalysisResult. All-or-nothing.

pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod summary;

pub use orchestrator::{AnalysisOrchestrator, Dimension};
