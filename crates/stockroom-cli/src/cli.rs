use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stockroom_core::models::{Collection, OutboxStatus, PaymentType};

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(about = "Offline point-of-sale client with background sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in to the CRM server
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Create or update products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Create or update customers
    Customer {
        #[command(subcommand)]
        command: CustomerCommands,
    },
    /// Record sales
    Sale {
        #[command(subcommand)]
        command: SaleCommands,
    },
    /// Record expenses
    Expense {
        #[command(subcommand)]
        command: ExpenseCommands,
    },
    /// List records of a collection
    List {
        #[arg(value_enum)]
        collection: CollectionArg,
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one record
    Get {
        #[arg(value_enum)]
        collection: CollectionArg,
        id: String,
    },
    /// Delete a record and queue the deletion for sync
    Delete {
        #[arg(value_enum)]
        collection: CollectionArg,
        id: String,
    },
    /// Inspect or clean the outbox
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },
    /// Show outbox counts and the last sync time
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push pending changes and pull server updates
    Sync {
        /// Keep syncing on the configured interval until Ctrl-C
        #[arg(long, conflicts_with_all = ["push_only", "pull_only"])]
        watch: bool,
        /// Only push the outbox
        #[arg(long, conflicts_with = "pull_only")]
        push_only: bool,
        /// Only pull server changes
        #[arg(long)]
        pull_only: bool,
    },
    /// Manage the offline page cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Show or change client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CollectionArg {
    Products,
    Sales,
    Expenses,
    Customers,
}

impl From<CollectionArg> for Collection {
    fn from(value: CollectionArg) -> Self {
        match value {
            CollectionArg::Products => Self::Products,
            CollectionArg::Sales => Self::Sales,
            CollectionArg::Expenses => Self::Expenses,
            CollectionArg::Customers => Self::Customers,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Pending,
    Sent,
    Failed,
}

impl From<StatusArg> for OutboxStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => Self::Pending,
            StatusArg::Sent => Self::Sent,
            StatusArg::Failed => Self::Failed,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PaymentArg {
    Cash,
    Card,
}

impl From<PaymentArg> for PaymentType {
    fn from(value: PaymentArg) -> Self {
        match value {
            PaymentArg::Cash => Self::Cash,
            PaymentArg::Card => Self::Card,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Exchange username/password for an access token
    Login {
        #[arg(long, value_name = "USERNAME")]
        username: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show whether a valid token is stored
    Status,
    /// Forget the stored token
    Logout,
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// Add a product
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        barcode: String,
        #[arg(long, default_value = "0")]
        buy_price: f64,
        #[arg(long, default_value = "0")]
        sell_price: f64,
        #[arg(long, default_value = "0")]
        stock_qty: i64,
    },
    /// Change product attributes
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        barcode: Option<String>,
        #[arg(long)]
        buy_price: Option<f64>,
        #[arg(long)]
        sell_price: Option<f64>,
        #[arg(long)]
        stock_qty: Option<i64>,
        /// Extra attribute as key=value (value parsed as JSON when possible)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        extra: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum CustomerCommands {
    /// Add a customer
    Add {
        #[arg(long)]
        full_name: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    /// Change customer attributes
    Update {
        id: String,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Extra attribute as key=value (value parsed as JSON when possible)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        extra: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum SaleCommands {
    /// Record a sale
    Add {
        /// Sold line as PRODUCT_ID:QTY[:PRICE]; price defaults to the product's sell price
        #[arg(long = "item", value_name = "ITEM", required = true)]
        items: Vec<String>,
        #[arg(long, value_enum, default_value_t = PaymentArg::Cash)]
        payment: PaymentArg,
        #[arg(long, default_value = "")]
        seller: String,
        /// Customer id
        #[arg(long)]
        customer: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record an expense
    Add {
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "")]
        note: String,
    },
}

#[derive(Subcommand)]
pub enum OutboxCommands {
    /// List change events
    List {
        /// Only show events with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove sent events (all of them when no id is given)
    Purge {
        event_id: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Download the offline pages into the current cache generation
    Install,
    /// Delete every other cache generation
    Activate,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Persist one configuration value
    Set { key: String, value: String },
    /// Print the config file location
    Path,
}
