use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use billbook::commands::bills::DateFilter;
use billbook::models::{BackendKind, PaymentMode};
use billbook::utils::parse_decimal;

#[derive(Parser)]
#[command(name = "billbook")]
#[command(about = "Bills and invoices for a small business.")]
pub struct CommandLine {
    /// Directory holding the database and stored files
    #[arg(long, global = true, env = "BILLBOOK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an account, sign in or out
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Show or edit the business profile
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Manage customers
    #[command(subcommand, alias = "c")]
    Customer(CustomerCommand),
    /// Create, list and print bills
    #[command(subcommand, alias = "b")]
    Bill(BillCommand),
    /// Bill count, yearly revenue and recent bills
    #[command(alias = "d")]
    Dashboard,
    /// Backend and display settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand)]
pub enum AuthCommand {
    SignUp(Credentials),
    SignIn(Credentials),
    SignOut,
    /// Show the signed-in user
    Whoami,
}

#[derive(Args)]
pub struct Credentials {
    #[arg(long)]
    pub email: String,
    #[arg(long, env = "BILLBOOK_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    Show,
    Set {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        company_name: Option<String>,
        #[arg(long)]
        company_address: Option<String>,
        #[arg(long)]
        gstin: Option<String>,
    },
    /// Upload a signature image for printed invoices
    Signature { path: PathBuf },
}

#[derive(Args, Default)]
pub struct CustomerArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub mobile: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
}

#[derive(Subcommand)]
pub enum CustomerCommand {
    Add(CustomerArgs),
    List,
    Show { id: String },
}

#[derive(Subcommand)]
pub enum BillCommand {
    /// Create a bill; `--preview` prints it without saving
    New(NewBillArgs),
    List {
        #[arg(long, default_value = "all")]
        filter: DateFilter,
        #[arg(long, short)]
        search: Option<String>,
    },
    Show { id: String },
    /// Write the invoice PDF
    Pdf {
        id: String,
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Open the PDF in the system viewer
        #[arg(long)]
        open: bool,
    },
}

#[derive(Args)]
pub struct NewBillArgs {
    /// Bill an existing customer
    #[arg(long, conflicts_with = "name")]
    pub customer_id: Option<String>,
    /// Name of a new customer
    #[arg(long, required_unless_present = "customer_id")]
    pub name: Option<String>,
    #[arg(long)]
    pub mobile: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    /// Line item as NAME:QUANTITY:PRICE, repeatable
    #[arg(long = "item", short, required = true)]
    pub items: Vec<ItemArg>,
    #[arg(long, default_value = "0", value_parser = parse_amount)]
    pub discount: f64,
    #[arg(long, default_value = "0", value_parser = parse_amount)]
    pub received: f64,
    #[arg(long, default_value = "cash")]
    pub payment_mode: PaymentMode,
    #[arg(long)]
    pub preview: bool,
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    Show,
    Set {
        #[arg(long)]
        backend: Option<BackendKind>,
        #[arg(long)]
        remote_url: Option<String>,
        #[arg(long)]
        remote_api_key: Option<String>,
        #[arg(long)]
        company_name: Option<String>,
        #[arg(long)]
        currency: Option<String>,
    },
    /// Check that a remote backend answers
    Test {
        #[arg(long)]
        url: String,
        #[arg(long)]
        api_key: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemArg {
    pub name: String,
    pub quantity: u32,
    pub price: f64,
}

impl FromStr for ItemArg {
    type Err = String;

    /// The name may itself contain colons; quantity and price are the last two fields.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.rsplitn(3, ':');
        let price = parts.next();
        let quantity = parts.next();
        let name = parts.next();
        let (Some(name), Some(quantity), Some(price)) = (name, quantity, price) else {
            return Err(format!("expected NAME:QUANTITY:PRICE, got '{}'", s));
        };
        let quantity = quantity
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("quantity '{}': {}", quantity, e))?;
        let price = parse_decimal(price).map_err(|e| e.to_string())?;
        Ok(ItemArg {
            name: name.trim().to_string(),
            quantity,
            price,
        })
    }
}

fn parse_amount(s: &str) -> Result<f64, String> {
    parse_decimal(s).map_err(|e| e.to_string())
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
