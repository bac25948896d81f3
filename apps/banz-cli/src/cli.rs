//! Command line definition.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use banz_core::{AuditAction, LineItem, Money, Payment, RecordId};

use crate::args::{parse_item, parse_money, parse_payment};

/// Banz POS: multi-store point of sale.
#[derive(Debug, Parser)]
#[command(name = "banz", version, about)]
pub struct Cli {
    /// Config file (default: platform config dir/banz.toml)
    #[arg(long, global = true, env = "BANZ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Never contact the remote store; sales and products are queued
    #[arg(long, global = true)]
    pub offline: bool,

    /// Answer yes to every confirmation prompt
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register stores, employees and products from a JSON file
    Seed {
        file: PathBuf,
    },

    /// Store selection
    #[command(subcommand)]
    Store(StoreCommand),

    /// Log an employee in
    Login {
        name: String,
        #[arg(long, env = "BANZ_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Clear the store and the operator
    Logout,

    /// Show the current store and operator
    Whoami,

    /// Record a sale
    Sell(SaleArgs),

    /// Sales of the current store
    #[command(subcommand)]
    Sales(SalesCommand),

    /// Replay the offline queue against the remote store
    Sync {
        /// Keep running and reconcile on every reconnect (probe interval, seconds)
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },

    /// Close past days and today, then export a backup
    CloseDay {
        /// Day to treat as today (default: current UTC date)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Close every past day that has open sales
    AutoClose {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Closed days of the current store
    #[command(subcommand)]
    Closures(ClosuresCommand),

    /// Product catalogue of the current store
    #[command(subcommand)]
    Products(ProductsCommand),

    /// Receive goods into the current store
    Entry {
        #[arg(long = "item", value_parser = parse_item, required = true)]
        items: Vec<LineItem>,
        /// Supplier or originating store (default: external supplier)
        #[arg(long)]
        from: Option<String>,
    },

    /// Move goods from the current store to another
    Transfer {
        destination: String,
        #[arg(long = "item", value_parser = parse_item, required = true)]
        items: Vec<LineItem>,
    },

    /// Write every collection to a JSON backup
    Export {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Administration
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    /// Registered stores
    List,
    /// Work for a store from now on
    Select { name: String },
}

/// Items, payments and note of a sale.
#[derive(Debug, Clone, Args)]
pub struct SaleArgs {
    /// NAME=QTY, repeatable
    #[arg(long = "item", value_parser = parse_item)]
    pub items: Vec<LineItem>,

    /// METHOD=AMOUNT (cash, pix, credit, debit), repeatable
    #[arg(long = "pay", value_parser = parse_payment)]
    pub payments: Vec<Payment>,

    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum SalesCommand {
    /// Open sales, including queued ones
    List,
    /// Delete a sale and return its items to stock
    Delete {
        #[arg(value_parser = parse_record_id)]
        id: RecordId,
    },
    /// Replace a sale's items, payments and note
    Edit {
        #[arg(value_parser = parse_record_id)]
        id: RecordId,
        #[command(flatten)]
        sale: SaleArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum ClosuresCommand {
    List,
    Show {
        id: String,
    },
    /// Delete a closure (stock is not restored)
    Delete {
        id: String,
    },
    /// Add a sale to a closed day
    AddSale {
        closure: String,
        #[command(flatten)]
        sale: SaleArgs,
    },
    /// Edit a sale inside a closure
    EditSale {
        closure: String,
        sale_id: String,
        #[command(flatten)]
        sale: SaleArgs,
    },
    /// Remove a sale from a closure and return its items to stock
    RemoveSale {
        closure: String,
        sale_id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProductsCommand {
    List,
    Add(ProductArgs),
    Edit {
        /// Current name
        current: String,
        #[command(flatten)]
        product: ProductArgs,
    },
    Delete {
        name: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ProductArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long = "qty")]
    pub quantity: i64,
    /// Minimum price (e.g. 6,00)
    #[arg(long, value_parser = parse_money)]
    pub min: Money,
    /// Maximum price
    #[arg(long, value_parser = parse_money)]
    pub max: Money,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    StoreAdd {
        name: String,
    },
    StoreRemove {
        name: String,
        #[arg(long, env = "BANZ_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,
    },
    EmployeeAdd {
        name: String,
        #[arg(long, env = "BANZ_PASSWORD", hide_env_values = true)]
        password: String,
    },
    EmployeeRemove {
        name: String,
        #[arg(long, env = "BANZ_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: String,
    },
    /// Audit log, newest first
    Logs {
        #[arg(long)]
        store: Option<String>,
        #[arg(long, value_parser = parse_action)]
        action: Option<AuditAction>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Units on hand per store
    StockTotals,
    /// Print the argon2 hash of a password (for `[admin] password_hash`)
    HashPassword {
        #[arg(long, env = "BANZ_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

fn parse_record_id(s: &str) -> Result<RecordId, banz_core::ValidationError> {
    s.parse()
}

fn parse_action(s: &str) -> Result<AuditAction, banz_core::ValidationError> {
    s.parse()
}
