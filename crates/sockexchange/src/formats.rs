//! Named, operator-configurable message templates.

use std::collections::BTreeMap;

pub const NO_PERM: &str = "NoPerm";
pub const USAGE: &str = "Usage";
pub const COMMAND_SENT: &str = "CommandSent";
pub const SERVER_NOT_FOUND: &str = "ServerNotFound";
pub const SERVER_NOT_ONLINE: &str = "ServerNotOnline";

/// Templates keyed by name. `{N}` in a template is replaced by the N-th
/// argument given to [`MessageFormatMap::format`].
#[derive(Debug, Clone, Default)]
pub struct MessageFormatMap {
    templates: BTreeMap<String, String>,
}

impl MessageFormatMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map preloaded with the built-in templates.
    pub fn with_defaults() -> Self {
        Self {
            templates: Self::default_templates(),
        }
    }

    /// The built-in templates used by the proxy commands.
    pub fn default_templates() -> BTreeMap<String, String> {
        [
            (NO_PERM, "You do not have permission to do that ({0})"),
            (USAGE, "Usage: {0}"),
            (COMMAND_SENT, "Command sent to {0}"),
            (SERVER_NOT_FOUND, "Server {0} was not found"),
            (SERVER_NOT_ONLINE, "Server {0} is not online"),
        ]
        .into_iter()
        .map(|(name, template)| (name.to_string(), template.to_string()))
        .collect()
    }

    pub fn insert(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.templates.insert(name.into(), template.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Renders the template called `name`.
    ///
    /// Placeholders without a matching argument are left as they are. An
    /// unknown name renders as `Format not found: <name>`.
    pub fn format(&self, name: &str, args: &[&str]) -> String {
        let Some(template) = self.templates.get(name) else {
            return format!("Format not found: {name}");
        };

        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();

        // Single pass so argument text containing "{N}" is never expanded again
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let substituted = after.find('}').and_then(|close| {
                let index: usize = after[..close].parse().ok()?;
                let arg = args.get(index)?;
                Some((arg, close))
            });

            match substituted {
                Some((arg, close)) => {
                    out.push_str(arg);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}
