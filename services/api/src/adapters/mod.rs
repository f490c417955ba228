pub mod db;
pub mod dialogue;
pub mod scripted;

pub use db::PgStore;
pub use dialogue::OpenAiDialogueAdapter;
pub use scripted::ScriptedDialogueAdapter;
