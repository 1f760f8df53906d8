/// Present only on sessions that passed the agent login.
pub const AGENT_EMAIL: &str = "agent_email";
