use clap::Subcommand;
use magicblock_core::{DatasetId, DatasetMeta, Request};

use super::{dispatch, CliResult};

#[derive(Subcommand)]
pub enum DatasetAction {
    /// Register a dataset with known metadata
    Add {
        /// <username>.<repository>.<branch>
        identity: DatasetId,
        /// Number of items
        #[arg(long)]
        length: usize,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Fetch a dataset's index.json and register it
    Import {
        /// <username>.<repository>.<branch>
        identity: DatasetId,
    },
    /// Unregister a dataset
    Remove {
        /// <username>.<repository>.<branch>
        identity: DatasetId,
    },
    /// List registered datasets
    List,
    /// Serve the next question
    Question,
}

pub async fn run(action: DatasetAction) -> CliResult {
    let request = match action {
        DatasetAction::Add {
            identity,
            length,
            name,
            author,
            description,
        } => Request::AddDataset {
            identity,
            meta: DatasetMeta {
                name,
                author,
                description,
                ..DatasetMeta::with_length(length)
            },
        },
        DatasetAction::Import { identity } => Request::ImportDataset { identity },
        DatasetAction::Remove { identity } => Request::RemoveDataset { identity },
        DatasetAction::List => Request::ListDatasets,
        DatasetAction::Question => Request::GetQuestion { is_retry: false },
    };
    dispatch(request).await
}
