//! Chat-template rendering.
//!
//! Models ship a Jinja template (in `tokenizer_config.json` or a standalone
//! `chat_template.jinja`) that flattens a message list into the single input
//! string the model was tuned on. Templates are written against Python's
//! Jinja, so string methods such as `.strip()` are enabled through
//! `minijinja-contrib`'s pycompat layer.

use minijinja::{context, Environment, ErrorKind};
use serde_json::Value;

use metaeval_llm::MessageSequence;

use crate::hub::ModelFiles;
use crate::{LocalError, Result};

const TEMPLATE_NAME: &str = "chat";

/// Special tokens declared in `tokenizer_config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialTokens {
    pub bos: Option<String>,
    pub eos: Option<String>,
    pub pad: Option<String>,
}

impl SpecialTokens {
    pub fn from_tokenizer_config(json: &Value) -> Self {
        Self {
            bos: token_content(&json["bos_token"]),
            eos: token_content(&json["eos_token"]),
            pad: token_content(&json["pad_token"]),
        }
    }
}

/// Tokens appear either as plain strings or as `{"content": "..."}` objects.
fn token_content(value: &Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value["content"].as_str())
        .map(str::to_string)
}

pub struct ChatTemplate {
    env: Environment<'static>,
    tokens: SpecialTokens,
    add_generation_prompt: bool,
}

impl std::fmt::Debug for ChatTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTemplate")
            .field("tokens", &self.tokens)
            .field("add_generation_prompt", &self.add_generation_prompt)
            .finish()
    }
}

impl ChatTemplate {
    pub fn new(source: impl Into<String>, tokens: SpecialTokens, add_generation_prompt: bool) -> Result<Self> {
        let mut env = Environment::new();
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        env.add_function("raise_exception", raise_exception);
        env.add_template_owned(TEMPLATE_NAME, source.into())?;
        Ok(Self { env, tokens, add_generation_prompt })
    }

    /// Load the template a model ships with. A model without one cannot be
    /// prompted in chat form and is rejected.
    pub fn load(files: &ModelFiles, add_generation_prompt: bool) -> Result<Self> {
        let tokenizer_config: Value = match &files.tokenizer_config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => Value::Null,
        };
        let tokens = SpecialTokens::from_tokenizer_config(&tokenizer_config);

        let source = match &files.chat_template {
            Some(path) => std::fs::read_to_string(path)?,
            None => template_source(&tokenizer_config).ok_or_else(|| {
                LocalError::Template("model ships no chat_template".to_string())
            })?,
        };
        Self::new(source, tokens, add_generation_prompt)
    }

    pub fn tokens(&self) -> &SpecialTokens {
        &self.tokens
    }

    /// Flatten one message sequence into the model's input string.
    pub fn render(&self, messages: &MessageSequence) -> Result<String> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let rendered = template.render(context! {
            messages => messages.as_slice(),
            bos_token => self.tokens.bos.as_deref().unwrap_or_default(),
            eos_token => self.tokens.eos.as_deref().unwrap_or_default(),
            add_generation_prompt => self.add_generation_prompt,
        })?;
        Ok(rendered)
    }
}

/// `chat_template` is a string, or a list of named templates (`default` preferred).
fn template_source(tokenizer_config: &Value) -> Option<String> {
    match &tokenizer_config["chat_template"] {
        Value::String(source) => Some(source.clone()),
        Value::Array(named) => named
            .iter()
            .find(|t| t["name"] == "default")
            .or_else(|| named.first())
            .and_then(|t| t["template"].as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn raise_exception(msg: String) -> std::result::Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CHATML: &str = "{% for message in messages %}{{ '<|im_start|>' + message['role'] + '\n' + message['content'] + '<|im_end|>' + '\n' }}{% endfor %}{% if add_generation_prompt %}{{ '<|im_start|>assistant\n' }}{% endif %}";

    const LLAMA2: &str = "{% if messages[0]['role'] == 'system' %}{% set loop_messages = messages[1:] %}{% set system_message = messages[0]['content'] %}{% else %}{% set loop_messages = messages %}{% set system_message = false %}{% endif %}{% for message in loop_messages %}{% if loop.index0 == 0 and system_message != false %}{% set content = '<<SYS>>\\n' + system_message + '\\n<</SYS>>\\n\\n' + message['content'] %}{% else %}{% set content = message['content'] %}{% endif %}{% if message['role'] == 'user' %}{{ bos_token + '[INST] ' + content.strip() + ' [/INST]' }}{% endif %}{% endfor %}";

    const NO_SYSTEM: &str = "{{ bos_token }}{% if messages[0]['role'] == 'system' %}{{ raise_exception('System role not supported') }}{% endif %}{% for message in messages %}{{ '<start_of_turn>user\n' + message['content'] | trim + '<end_of_turn>\n' }}{% endfor %}";

    fn tokens() -> SpecialTokens {
        SpecialTokens { bos: Some("<s>".into()), eos: Some("</s>".into()), pad: None }
    }

    #[test]
    fn test_chatml_without_generation_prompt() {
        let t = ChatTemplate::new(CHATML, tokens(), false).unwrap();
        let out = t.render(&MessageSequence::assemble("Is 7 prime?", Some("Be brief."))).unwrap();
        assert_eq!(
            out,
            "<|im_start|>system\nBe brief.<|im_end|>\n<|im_start|>user\nIs 7 prime?<|im_end|>\n"
        );
    }

    #[test]
    fn test_chatml_with_generation_prompt() {
        let t = ChatTemplate::new(CHATML, tokens(), true).unwrap();
        let out = t.render(&MessageSequence::assemble("Is 7 prime?", None)).unwrap();
        assert_eq!(out, "<|im_start|>user\nIs 7 prime?<|im_end|>\n<|im_start|>assistant\n");
    }

    #[test]
    fn test_python_string_methods_and_bos_token() {
        let t = ChatTemplate::new(LLAMA2, tokens(), false).unwrap();
        // strip() only trims the ends of the combined content
        let out = t.render(&MessageSequence::assemble("  hello  ", Some("sys"))).unwrap();
        assert_eq!(out, "<s>[INST] <<SYS>>\nsys\n<</SYS>>\n\n  hello [/INST]");
    }

    #[test]
    fn test_raise_exception_surfaces_as_template_error() {
        let t = ChatTemplate::new(NO_SYSTEM, tokens(), false).unwrap();
        assert!(t.render(&MessageSequence::assemble("hi", None)).is_ok());
        let err = t.render(&MessageSequence::assemble("hi", Some("sys"))).unwrap_err();
        assert!(matches!(err, LocalError::Template(msg) if msg.contains("System role not supported")));
    }

    #[test]
    fn test_special_tokens_accept_object_form() {
        let cfg = json!({
            "bos_token": {"content": "<|begin_of_text|>", "lstrip": false},
            "eos_token": "<|eot_id|>",
            "pad_token": null
        });
        assert_eq!(
            SpecialTokens::from_tokenizer_config(&cfg),
            SpecialTokens {
                bos: Some("<|begin_of_text|>".into()),
                eos: Some("<|eot_id|>".into()),
                pad: None,
            }
        );
    }

    #[test]
    fn test_named_template_list_prefers_default() {
        let cfg = json!({
            "chat_template": [
                {"name": "tool_use", "template": "TOOLS"},
                {"name": "default", "template": "DEFAULT"}
            ]
        });
        assert_eq!(template_source(&cfg).as_deref(), Some("DEFAULT"));
        assert_eq!(template_source(&json!({})), None);
    }
}
