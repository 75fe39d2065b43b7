mod anthropic;
mod factory;
mod http;
mod openai_compat;

pub use anthropic::AnthropicClient;
pub use factory::{api_key_from_env, build_client, ClientSettings, Provider};
pub use openai_compat::OpenAiCompatClient;
