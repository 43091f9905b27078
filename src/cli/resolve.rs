use super::format_output;
use super::table::Table;
use crate::config::Config;
use crate::registry::resolver::Client;
use crate::{warn, ResolveArgs};

#[derive(serde::Serialize, Debug, PartialEq)]
struct ResolvedModel {
    title: String,
    provider: String,
    model: String,
    endpoint: String,
}

impl From<&Client> for ResolvedModel {
    fn from(client: &Client) -> Self {
        ResolvedModel {
            title: client.title().to_string(),
            provider: client.id().to_string(),
            model: client.model().to_string(),
            endpoint: client.api_base().to_string(),
        }
    }
}

impl From<Vec<ResolvedModel>> for Table {
    fn from(value: Vec<ResolvedModel>) -> Self {
        let mut tab = Table::with_header(vec!["TITLE", "PROVIDER", "MODEL", "ENDPOINT"]);

        for model in value {
            tab.add_row(vec![
                model.title,
                model.provider,
                model.model,
                model.endpoint,
            ]);
        }

        tab
    }
}

pub(crate) async fn resolve_cmd(config: &Config, args: &ResolveArgs) {
    if config.models.is_empty() {
        warn!("no models are configured");
    }

    let resolver = super::resolver(config).await;

    let clients = resolver.resolve_all(&config.models).await;

    let models: Vec<ResolvedModel> = clients.iter().map(ResolvedModel::from).collect();

    format_output(models, args.format);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_shows_endpoint() {
        let models = vec![ResolvedModel {
            title: "Local".to_string(),
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
            endpoint: "http://localhost:11434/".to_string(),
        }];

        assert_eq!(
            Table::from(models).to_string(),
            concat!(
                "TITLE  PROVIDER  MODEL   ENDPOINT\n",
                "Local  ollama    llama3  http://localhost:11434/\n",
            )
        );
    }
}
