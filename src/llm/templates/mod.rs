
use fancy_regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::config::TemplateConfig;
use crate::{RagError, Result};

/// Renders named prompt templates with variable substitution
pub trait TemplateResolver: Send + Sync {
    fn render(&self, namespace: &str, name: &str, vars: &[(&str, &str)]) -> Result<String>;
}

const EN_RAG: &[(&str, &str)] = &[
    (
        "system_prompt",
        "You are an assistant to generate a response for the user.
You will be provided by a set of documents associated with the user's query.
You have to generate a response based on the documents provided.
Ignore the documents that are not relevant to the user's query.
You can apologize to the user if you are not able to generate a response.
You have to generate response in the same language as the user's query.
Be polite and respectful to the user.
Be precise and concise in your response. Avoid unnecessary information.",
    ),
    (
        "document_prompt",
        "## Document No: $doc_num
### Content: $chunk_text",
    ),
    (
        "footer_prompt",
        "Based only on the above documents, please generate an answer for the user.
## Question:
$query

## Answer:",
    ),
];

const AR_RAG: &[(&str, &str)] = &[
    (
        "system_prompt",
        "أنت مساعد لتوليد رد للمستخدم.
ستحصل على مجموعة من المستندات المرتبطة باستفسار المستخدم.
عليك أن تولد ردًا بناءً على المستندات المقدمة.
تجاهل المستندات التي لا تتعلق باستفسار المستخدم.
يمكنك الاعتذار للمستخدم إذا لم تتمكن من توليد رد.
عليك أن تولد الرد بنفس لغة استفسار المستخدم.
كن مهذبًا ومحترمًا في التعامل مع المستخدم.
كن دقيقًا ومختصرًا في ردك. تجنب المعلومات غير الضرورية.",
    ),
    (
        "document_prompt",
        "## المستند رقم: $doc_num
### المحتوى: $chunk_text",
    ),
    (
        "footer_prompt",
        "بناءً فقط على المستندات السابقة، يرجى توليد إجابة للمستخدم.
## السؤال:
$query

## الإجابة:",
    ),
];

const BUILTIN: &[(&str, &str, &[(&str, &str)])] = &[("en", "rag", EN_RAG), ("ar", "rag", AR_RAG)];

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("valid regex")
});

/// language -> namespace -> template name -> template text
type Catalog = HashMap<String, HashMap<String, HashMap<String, String>>>;

/// Localized prompt templates.
///
/// Lookups try the primary language first and fall back to the default
/// language.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    primary_language: String,
    default_language: String,
    catalog: Catalog,
}

impl PromptTemplates {
    /// Built-in templates only
    #[inline]
    pub fn new(config: &TemplateConfig) -> Self {
        let mut templates = Self {
            primary_language: config.primary_language.clone(),
            default_language: config.default_language.clone(),
            catalog: HashMap::new(),
        };

        for (language, namespace, entries) in BUILTIN {
            for (name, template) in *entries {
                templates.insert(language, namespace, name, template);
            }
        }

        templates
    }

    /// Built-in templates overridden by `<dir>/<language>/<namespace>.toml` files
    #[inline]
    pub fn load(config: &TemplateConfig, templates_dir: &Path) -> Result<Self> {
        let mut templates = Self::new(config);

        if !templates_dir.is_dir() {
            debug!("No template overrides at {}", templates_dir.display());
            return Ok(templates);
        }

        for language_entry in fs::read_dir(templates_dir)? {
            let language_path = language_entry?.path();
            if !language_path.is_dir() {
                continue;
            }
            let Some(language) = language_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            for file_entry in fs::read_dir(&language_path)? {
                let file_path = file_entry?.path();
                if file_path.extension().and_then(|e| e.to_str()) != Some("toml") {
                    continue;
                }
                let Some(namespace) = file_path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };

                let content = fs::read_to_string(&file_path)?;
                let entries: HashMap<String, String> = toml::from_str(&content).map_err(|e| {
                    RagError::Template(format!(
                        "Invalid template file {}: {}",
                        file_path.display(),
                        e
                    ))
                })?;

                info!(
                    "Loaded {} {} templates for language {}",
                    entries.len(),
                    namespace,
                    language
                );
                for (name, template) in &entries {
                    templates.insert(language, namespace, name, template);
                }
            }
        }

        Ok(templates)
    }

    #[inline]
    pub fn insert(&mut self, language: &str, namespace: &str, name: &str, template: &str) {
        self.catalog
            .entry(language.to_string())
            .or_default()
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), template.to_string());
    }

    #[inline]
    pub fn primary_language(&self) -> &str {
        &self.primary_language
    }

    /// Raw template text, with language fallback
    #[inline]
    pub fn get(&self, namespace: &str, name: &str) -> Option<&str> {
        [&self.primary_language, &self.default_language]
            .into_iter()
            .find_map(|language| {
                self.catalog
                    .get(language)?
                    .get(namespace)?
                    .get(name)
                    .map(String::as_str)
            })
    }
}

impl TemplateResolver for PromptTemplates {
    fn render(&self, namespace: &str, name: &str, vars: &[(&str, &str)]) -> Result<String> {
        let template = self.get(namespace, name).ok_or_else(|| {
            RagError::Template(format!(
                "Template {}.{} not found for language {} or {}",
                namespace, name, self.primary_language, self.default_language
            ))
        })?;

        Ok(substitute(template, vars))
    }
}

/// Replace `$name` and `${name}` placeholders; `$$` yields `$` and unknown
/// placeholders are kept as written
#[inline]
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                return "$".to_string();
            }

            let key = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            vars.iter()
                .find(|(name, _)| *name == key)
                .map_or_else(
                    || caps.get(0).map_or(String::new(), |m| m.as_str().to_string()),
                    |(_, value)| (*value).to_string(),
                )
        })
        .into_owned()
}
