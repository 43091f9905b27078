use super::format_output;
use super::table::Table;
use crate::registry::routing::is_always_local;
use crate::registry::{ClientRegistration, Registry};
use crate::{ListArgs, ListObject};

#[derive(serde::Serialize)]
struct Provider {
    provider: String,
    local: bool,
    max_tokens: Option<u32>,
}

impl From<&ClientRegistration> for Provider {
    fn from(registration: &ClientRegistration) -> Self {
        Provider {
            provider: registration.name.clone(),
            local: is_always_local(&registration.name),
            max_tokens: registration.defaults.max_tokens,
        }
    }
}

impl From<Vec<Provider>> for Table {
    fn from(value: Vec<Provider>) -> Self {
        let mut tab = Table::with_header(vec!["PROVIDER", "LOCAL", "MAX_TOKENS"]);

        for provider in value {
            tab.add_row(vec![
                provider.provider,
                if provider.local { "yes" } else { "no" }.to_string(),
                match provider.max_tokens {
                    Some(max_tokens) => max_tokens.to_string(),
                    None => "default".to_string(),
                },
            ]);
        }

        tab
    }
}

fn get_providers(registry: &Registry) -> Vec<Provider> {
    registry.entries().iter().map(Provider::from).collect()
}

pub(crate) fn list_cmd(args: &ListArgs) {
    match &args.object {
        ListObject::Providers => {
            let providers = get_providers(&Registry::builtin());
            format_output(providers, args.format);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_table() {
        let tab: Table = get_providers(&Registry::builtin()).into();

        let output = tab.to_string();
        let mut lines = output.lines();

        assert_eq!(lines.next(), Some("PROVIDER   LOCAL  MAX_TOKENS"));
        assert_eq!(lines.next(), Some("ollama     yes    default"));
        assert_eq!(lines.next(), Some("openai     no     4096"));
    }
}
