pub mod preferences;
pub mod session;
pub mod view;

pub use preferences::{Decision, DecisionCounts, PreferenceEntry, PreferenceIndex, RenameSummary};
pub use session::ReviewSession;
pub use view::{BrowseMode, ViewFilter};
