/// Progress reported while a query runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    ToolCallStart { id: String, name: String },
    ToolCallResult {
        id: String,
        name: String,
        is_error: bool,
    },
}
