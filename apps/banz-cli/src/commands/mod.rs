//! # Commands Module
//!
//! Every subcommand, grouped by workflow.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs       ◄─── You are here (dispatch)
//! ├── session.rs   ◄─── store list/select, login, logout, whoami
//! ├── sales.rs     ◄─── sell, sales list/delete/edit
//! ├── sync.rs      ◄─── sync, sync --watch
//! ├── closeout.rs  ◄─── close-day, auto-close, closures, export
//! ├── products.rs  ◄─── products, entry, transfer
//! └── admin.rs     ◄─── admin, seed
//! ```
//!
//! ## How Commands Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  banz sell --item Caderno=2 --pay cash=10,00                            │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  main: parse → load config → BanzServices::open                         │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  commands::run(&app, Command::Sell(..))                                 │
//! │         │  session.current() → SessionContext                           │
//! │         │  services.sales.submit(&ctx, &draft)                           │
//! │         ▼                                                               │
//! │  Printer: text line, or JSON with --json                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod admin;
pub mod closeout;
pub mod products;
pub mod sales;
pub mod session;
pub mod sync;

use chrono::{NaiveDate, Utc};

use banz_core::{SaleDraft, SessionContext};
use banz_sync::BanzServices;

use crate::cli::{Command, SaleArgs};
use crate::error::ApiError;
use crate::output::Printer;

/// What every command gets.
pub struct App {
    pub services: BanzServices,
    pub out: Printer,
}

impl App {
    /// Current store and operator.
    pub async fn ctx(&self) -> Result<SessionContext, ApiError> {
        Ok(self.services.session.current().await?)
    }
}

/// The day closeouts and exports default to.
pub fn today(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| Utc::now().date_naive())
}

impl From<SaleArgs> for SaleDraft {
    fn from(args: SaleArgs) -> Self {
        SaleDraft {
            items: args.items,
            payments: args.payments,
            note: args.note,
        }
    }
}

pub async fn run(app: &App, command: Command) -> Result<(), ApiError> {
    match command {
        Command::Seed { file } => admin::seed(app, &file).await,
        Command::Store(cmd) => session::store(app, cmd).await,
        Command::Login { name, password } => session::login(app, &name, &password).await,
        Command::Logout => session::logout(app).await,
        Command::Whoami => session::whoami(app).await,
        Command::Sell(sale) => sales::sell(app, sale.into()).await,
        Command::Sales(cmd) => sales::sales(app, cmd).await,
        Command::Sync { watch } => sync::sync(app, watch).await,
        Command::CloseDay { date } => closeout::close_day(app, today(date)).await,
        Command::AutoClose { date } => closeout::auto_close(app, today(date)).await,
        Command::Closures(cmd) => closeout::closures(app, cmd).await,
        Command::Products(cmd) => products::products(app, cmd).await,
        Command::Entry { items, from } => products::entry(app, items, from).await,
        Command::Transfer { destination, items } => products::transfer(app, &destination, items).await,
        Command::Export { date } => closeout::export(app, today(date)).await,
        Command::Admin(cmd) => admin::admin(app, cmd).await,
    }
}
