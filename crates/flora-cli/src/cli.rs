use clap::{Args, Parser, Subcommand, ValueEnum};
use flora_api::PlantStatus;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flora")]
#[command(about = "Identify plants, browse the catalog and chat about results", long_about = None)]
pub struct Cli {
    /// Backend base URL (overrides FLORA_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Upload an image and show the identification result
    Identify {
        image: PathBuf,
        /// Question to ask about the result; repeat for several
        #[arg(long)]
        ask: Vec<String>,
    },
    /// Past identifications
    Identifications {
        #[command(subcommand)]
        action: IdentificationsAction,
    },
    /// Plant catalog
    Plants {
        #[command(subcommand)]
        action: PlantsAction,
    },
    /// Plant families
    Families {
        #[command(subcommand)]
        action: FamiliesAction,
    },
    /// Taxonomic classifications
    Taxonomies {
        #[command(subcommand)]
        action: TaxonomiesAction,
    },
    /// Identification provider credit usage
    Usage,
    /// Conversations about identifications
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
}

#[derive(Subcommand)]
pub enum IdentificationsAction {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    Show { id: u64 },
}

#[derive(Subcommand)]
pub enum PlantsAction {
    List {
        /// Filter the current page by scientific or common name
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        status: Option<PlantStatus>,
    },
    Show {
        id: u64,
    },
    Create {
        #[command(flatten)]
        fields: PlantFields,
        /// Image file to attach
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Replace a plant's fields; omitted fields keep their current value
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "common-name")]
        common_names: Vec<String>,
        #[arg(long)]
        taxonomy_id: Option<u64>,
        #[arg(long)]
        family_id: Option<u64>,
    },
    Status {
        id: u64,
        status: PlantStatus,
    },
}

#[derive(Args)]
pub struct PlantFields {
    /// Scientific name
    #[arg(long)]
    pub name: String,
    /// Common name; repeat for several
    #[arg(long = "common-name")]
    pub common_names: Vec<String>,
    #[arg(long)]
    pub taxonomy_id: u64,
    #[arg(long)]
    pub family_id: Option<u64>,
}

#[derive(Subcommand)]
pub enum FamiliesAction {
    List {
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Update {
        id: u64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Status {
        id: u64,
        #[arg(value_enum)]
        state: Activity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Activity {
    Active,
    Inactive,
}

#[derive(Subcommand)]
pub enum TaxonomiesAction {
    List {
        #[arg(long)]
        family_id: Option<u64>,
    },
    Create {
        #[command(flatten)]
        fields: TaxonomyFields,
    },
    Update {
        id: u64,
        #[command(flatten)]
        fields: TaxonomyFields,
    },
}

#[derive(Args)]
pub struct TaxonomyFields {
    #[arg(long)]
    pub family_id: u64,
    #[arg(long)]
    pub kingdom: Option<String>,
    #[arg(long)]
    pub phylum: Option<String>,
    #[arg(long)]
    pub class: Option<String>,
    #[arg(long)]
    pub order: Option<String>,
    #[arg(long)]
    pub genus: Option<String>,
    #[arg(long)]
    pub species: Option<String>,
    #[arg(long)]
    pub rank: Option<String>,
}

#[derive(Subcommand)]
pub enum ChatAction {
    /// Start a conversation and chat interactively, one message per line
    Start {
        #[arg(long)]
        identification_id: String,
        #[arg(long)]
        secret: String,
    },
    Show {
        id: u64,
    },
    History {
        id: u64,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    Send {
        id: u64,
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plant_list() {
        let cli = Cli::try_parse_from([
            "flora", "plants", "list", "--query", "rose", "--status", "inactive", "--page", "2",
        ])
        .unwrap();
        match cli.command {
            Command::Plants {
                action: PlantsAction::List { query, page, status },
            } => {
                assert_eq!(query.as_deref(), Some("rose"));
                assert_eq!(page, 2);
                assert_eq!(status, Some(PlantStatus::Inactive));
            }
            _ => panic!("expected plants list"),
        }
    }

    #[test]
    fn test_parse_identify_with_questions() {
        let cli = Cli::try_parse_from([
            "flora", "identify", "leaf.jpg", "--ask", "Is it edible?", "--ask", "Where?",
            "--api-url", "http://localhost:3000",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://localhost:3000"));
        match cli.command {
            Command::Identify { image, ask } => {
                assert_eq!(image, PathBuf::from("leaf.jpg"));
                assert_eq!(ask, vec!["Is it edible?".to_string(), "Where?".to_string()]);
            }
            _ => panic!("expected identify"),
        }
    }

    #[test]
    fn test_invalid_status_rejected() {
        assert!(Cli::try_parse_from(["flora", "plants", "status", "1", "dormant"]).is_err());
    }
}
