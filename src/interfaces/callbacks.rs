/// Observes one agent's runs. A handler is created per agent, so it already
/// knows whose output it is looking at.
pub trait CallbackHandler: Send + Sync {
    fn on_chain_start(&self, input: &str);
    fn on_chain_end(&self, output: &str);
    fn on_tool_result(&self, _tool: &str, _status: &str) {}
}
