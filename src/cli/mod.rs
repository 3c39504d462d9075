use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{
    AdvanceChanges, CashBoxChanges, CashBoxFilter, CashBoxRef, CashBoxService, NewCashBox,
};
use crate::config::Settings;
use crate::domain::{
    closing_balance, format_brl, format_brl_currency, format_date_br, parse_cents, parse_date,
    truncate, Cents, NewLedgerEntry, NOT_SPECIFIED,
};

/// Caixa - Travel cash box ledger
#[derive(Parser)]
#[command(name = "caixa")]
#[command(
    about = "Travel cash boxes: ledger entries, advances, balance carry-forward and settlement sheets"
)]
#[command(version)]
pub struct Cli {
    /// Settings file (TOML). caixa.toml is read when present
    #[arg(long, global = true, env = "CAIXA_CONFIG")]
    pub config: Option<String>,

    /// Database file path (overrides the settings file)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Company management commands
    #[command(subcommand)]
    Company(CompanyCommands),

    /// Employee management commands
    #[command(subcommand)]
    Employee(EmployeeCommands),

    /// Vehicle management commands
    #[command(subcommand)]
    Vehicle(VehicleCommands),

    /// Travel cash box commands
    #[command(name = "box")]
    #[command(subcommand)]
    CashBox(BoxCommands),

    /// Cash advance commands
    #[command(subcommand)]
    Advance(AdvanceCommands),

    /// Recalculate opening and closing balances
    Recalc {
        /// Only this employee's boxes (omit for everyone)
        #[arg(long)]
        employee: Option<String>,
    },

    /// Generate the settlement PDF of a cash box
    Report {
        /// Employee name
        employee: String,

        /// Box number
        number: i64,

        /// Output file (defaults to the suggested file name)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: boxes, advances, entries, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Employee of the box (entries export)
        #[arg(long)]
        employee: Option<String>,

        /// Box number (entries export)
        #[arg(long)]
        number: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum CompanyCommands {
    /// Register a company
    Create {
        /// Company name (must be unique)
        name: String,

        /// Tax id (CNPJ)
        #[arg(long)]
        tax_id: Option<String>,
    },

    /// List companies
    List {
        /// Include hidden companies
        #[arg(long)]
        all: bool,
    },

    /// Show company details
    Show {
        /// Company name
        name: String,
    },

    /// Rename a company or change its tax id
    Update {
        /// Company name
        name: String,

        /// New name
        #[arg(long = "name")]
        new_name: Option<String>,

        /// New tax id
        #[arg(long)]
        tax_id: Option<String>,
    },

    /// Hide a company (soft delete)
    Hide {
        /// Company name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum EmployeeCommands {
    /// Register an employee
    Create {
        /// Employee name (must be unique)
        name: String,

        /// Identity document (CPF)
        #[arg(long)]
        document: Option<String>,

        /// Company the employee works for
        #[arg(long)]
        company: Option<String>,
    },

    /// List employees
    List {
        /// Include hidden employees
        #[arg(long)]
        all: bool,
    },

    /// Show employee details
    Show {
        /// Employee name
        name: String,
    },

    /// Update an employee
    Update {
        /// Employee name
        name: String,

        /// New name
        #[arg(long = "name")]
        new_name: Option<String>,

        /// New document
        #[arg(long)]
        document: Option<String>,

        /// New company
        #[arg(long)]
        company: Option<String>,
    },

    /// Hide an employee (soft delete)
    Hide {
        /// Employee name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum VehicleCommands {
    /// Register a vehicle
    Create {
        /// License plate (must be unique)
        plate: String,

        /// Vehicle model
        #[arg(long)]
        model: Option<String>,
    },

    /// List vehicles
    List {
        /// Include hidden vehicles
        #[arg(long)]
        all: bool,
    },

    /// Show vehicle details
    Show {
        /// License plate
        plate: String,
    },

    /// Change a vehicle's model
    Update {
        /// License plate
        plate: String,

        /// New model
        #[arg(long)]
        model: Option<String>,
    },

    /// Hide a vehicle (soft delete)
    Hide {
        /// License plate
        plate: String,
    },
}

#[derive(Subcommand)]
pub enum BoxCommands {
    /// Open a new cash box for an employee
    Create {
        /// Employee name
        #[arg(long)]
        employee: String,

        /// Company paying for the trip
        #[arg(long)]
        company: String,

        /// Trip destination
        #[arg(long)]
        destination: String,

        /// Trip date (YYYY-MM-DD or DD/MM/YYYY, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Vehicle plate
        #[arg(long)]
        vehicle: Option<String>,

        /// Free text note
        #[arg(long)]
        note: Option<String>,

        /// Opening balance, only for the employee's first box
        #[arg(long, allow_hyphen_values = true)]
        opening: Option<String>,
    },

    /// Show the number and opening balance the next box would get
    Next {
        /// Employee name
        employee: String,
    },

    /// Edit the trip data of a box
    Edit {
        /// Employee name
        employee: String,

        /// Box number
        number: i64,

        /// New company
        #[arg(long)]
        company: Option<String>,

        /// New vehicle plate
        #[arg(long, conflicts_with = "no_vehicle")]
        vehicle: Option<String>,

        /// Remove the vehicle
        #[arg(long)]
        no_vehicle: bool,

        /// New trip date
        #[arg(long)]
        date: Option<String>,

        /// New destination
        #[arg(long)]
        destination: Option<String>,

        /// New note (empty clears it)
        #[arg(long)]
        note: Option<String>,
    },

    /// List cash boxes
    List {
        /// Filter by employee
        #[arg(long)]
        employee: Option<String>,

        /// Filter by company
        #[arg(long)]
        company: Option<String>,

        /// Filter by destination (substring)
        #[arg(long)]
        destination: Option<String>,

        /// Trip date from (inclusive)
        #[arg(long)]
        from: Option<String>,

        /// Trip date to (inclusive)
        #[arg(long)]
        to: Option<String>,

        /// Include hidden boxes
        #[arg(long)]
        all: bool,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,

        /// Boxes per page (omit for all)
        #[arg(long)]
        per_page: Option<usize>,
    },

    /// Show a box with its entries and advances
    Show {
        /// Employee name
        employee: String,

        /// Box number
        number: i64,
    },

    /// Hide a box and release its advances
    Hide {
        /// Employee name
        employee: String,

        /// Box number
        number: i64,
    },

    /// Replace the entries of a box from CSV
    Entries {
        /// Employee name
        employee: String,

        /// Box number
        number: i64,

        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Preview without importing
        #[arg(long)]
        dry_run: bool,

        /// Validate without importing
        #[arg(long)]
        validate: bool,
    },

    /// Append one entry to a box
    AddEntry {
        /// Employee name
        employee: String,

        /// Box number
        number: i64,

        /// Entry date (defaults to the trip date)
        #[arg(long)]
        date: Option<String>,

        /// Receipt or invoice number
        #[arg(long)]
        document: Option<String>,

        /// Supplier
        #[arg(long)]
        counterparty: Option<String>,

        /// Cost type (fuel, meals, tolls, ...)
        #[arg(long)]
        cost_type: Option<String>,

        /// Description
        #[arg(long)]
        description: Option<String>,

        /// Money received
        #[arg(long)]
        credit: Option<String>,

        /// Money spent
        #[arg(long)]
        debit: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AdvanceCommands {
    /// Record a cash advance to an employee
    Create {
        /// Employee name
        employee: String,

        /// Amount (e.g., "500" or "1.234,56")
        amount: String,

        /// Date (defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Note
        #[arg(long)]
        note: Option<String>,
    },

    /// List advances
    List {
        /// Filter by employee
        #[arg(long)]
        employee: Option<String>,

        /// Only advances not linked to a box
        #[arg(long)]
        unlinked: bool,
    },

    /// Edit a free advance
    Edit {
        /// Advance ID
        id: String,

        /// New amount
        #[arg(long)]
        amount: Option<String>,

        /// New date
        #[arg(long)]
        date: Option<String>,

        /// New note (empty clears it)
        #[arg(long)]
        note: Option<String>,
    },

    /// Delete a free advance
    Delete {
        /// Advance ID
        id: String,
    },

    /// Apply an advance to a cash box
    Link {
        /// Advance ID
        id: String,

        /// Employee of the box
        employee: String,

        /// Box number
        number: i64,
    },

    /// Release an advance from its box
    Unlink {
        /// Advance ID
        id: String,
    },
}

impl Cli {
    pub async fn run(self, settings: Settings) -> Result<()> {
        let database = settings.database.clone();

        if let Commands::Init = self.command {
            CashBoxService::init(&database).await?;
            println!("Database initialized: {}", database);
            return Ok(());
        }

        let service = CashBoxService::connect(&database)
            .await
            .with_context(|| format!("Failed to open database {} (run `caixa init`?)", database))?
            .with_report_options(settings.report_options());

        match self.command {
            Commands::Init => {}
            Commands::Company(cmd) => run_company_command(&service, cmd).await?,
            Commands::Employee(cmd) => run_employee_command(&service, cmd).await?,
            Commands::Vehicle(cmd) => run_vehicle_command(&service, cmd).await?,
            Commands::CashBox(cmd) => run_box_command(&service, cmd).await?,
            Commands::Advance(cmd) => run_advance_command(&service, cmd).await?,
            Commands::Recalc { employee } => {
                run_recalc_command(&service, employee.as_deref()).await?
            }
            Commands::Report {
                employee,
                number,
                output,
            } => {
                let reference = CashBoxRef::new(employee, number);
                let document = service.settlement_document(&reference).await?;
                let path = output.unwrap_or_else(|| document.file_name.clone());
                std::fs::write(&path, &document.bytes)
                    .with_context(|| format!("Failed to write settlement file: {}", path))?;
                println!(
                    "Settlement for {} written to {} ({} page(s))",
                    reference, path, document.page_count
                );
            }
            Commands::Export {
                export_type,
                output,
                employee,
                number,
            } => {
                let reference = match (employee, number) {
                    (Some(employee), Some(number)) => Some(CashBoxRef::new(employee, number)),
                    _ => None,
                };
                run_export_command(&service, &export_type, output.as_deref(), reference).await?;
            }
        }

        Ok(())
    }
}

async fn run_company_command(service: &CashBoxService, cmd: CompanyCommands) -> Result<()> {
    match cmd {
        CompanyCommands::Create { name, tax_id } => {
            let company = service.create_company(name, tax_id).await?;
            println!("Created company: {}", company.name);
        }

        CompanyCommands::List { all } => {
            let companies = service.list_companies(all).await?;
            if companies.is_empty() {
                println!("No companies found.");
            } else {
                println!("{:<30} {:<20} {:<8}", "NAME", "TAX ID", "HIDDEN");
                println!("{}", "-".repeat(60));
                for company in companies {
                    println!(
                        "{:<30} {:<20} {:<8}",
                        truncate(&company.name, 30),
                        company.tax_id.as_deref().unwrap_or("-"),
                        yes_no(company.is_hidden())
                    );
                }
            }
        }

        CompanyCommands::Show { name } => {
            let company = service.get_company(&name).await?;
            println!("Company: {}", company.name);
            println!("  ID:       {}", company.id);
            println!(
                "  Tax id:   {}",
                company.tax_id.as_deref().unwrap_or(NOT_SPECIFIED)
            );
            println!(
                "  Created:  {}",
                company.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(hidden) = company.hidden_at {
                println!("  Hidden:   {}", hidden.format("%Y-%m-%d %H:%M:%S"));
            }
        }

        CompanyCommands::Update {
            name,
            new_name,
            tax_id,
        } => {
            let company = service.update_company(&name, new_name, tax_id).await?;
            println!("Updated company: {}", company.name);
        }

        CompanyCommands::Hide { name } => {
            service.hide_company(&name).await?;
            println!("Hid company: {}", name);
        }
    }
    Ok(())
}

async fn run_employee_command(service: &CashBoxService, cmd: EmployeeCommands) -> Result<()> {
    match cmd {
        EmployeeCommands::Create {
            name,
            document,
            company,
        } => {
            let employee = service
                .create_employee(name, document, company.as_deref())
                .await?;
            println!("Created employee: {}", employee.name);
        }

        EmployeeCommands::List { all } => {
            let employees = service.list_employees(all).await?;
            if employees.is_empty() {
                println!("No employees found.");
            } else {
                println!("{:<30} {:<18} {:<8}", "NAME", "DOCUMENT", "HIDDEN");
                println!("{}", "-".repeat(58));
                for employee in employees {
                    println!(
                        "{:<30} {:<18} {:<8}",
                        truncate(&employee.name, 30),
                        employee.document.as_deref().unwrap_or("-"),
                        yes_no(employee.is_hidden())
                    );
                }
            }
        }

        EmployeeCommands::Show { name } => {
            let employee = service.get_employee(&name).await?;
            let next = service.next_cash_box(&name).await?;

            println!("Employee: {}", employee.name);
            println!("  ID:        {}", employee.id);
            println!(
                "  Document:  {}",
                employee.document.as_deref().unwrap_or(NOT_SPECIFIED)
            );
            println!(
                "  Created:   {}",
                employee.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(hidden) = employee.hidden_at {
                println!("  Hidden:    {}", hidden.format("%Y-%m-%d %H:%M:%S"));
            }
            println!();
            println!("  Boxes:     {}", next.number - 1);
            println!(
                "  Balance:   {}",
                format_brl_currency(next.opening_balance)
            );
        }

        EmployeeCommands::Update {
            name,
            new_name,
            document,
            company,
        } => {
            let employee = service
                .update_employee(&name, new_name, document, company.as_deref())
                .await?;
            println!("Updated employee: {}", employee.name);
        }

        EmployeeCommands::Hide { name } => {
            service.hide_employee(&name).await?;
            println!("Hid employee: {}", name);
        }
    }
    Ok(())
}

async fn run_vehicle_command(service: &CashBoxService, cmd: VehicleCommands) -> Result<()> {
    match cmd {
        VehicleCommands::Create { plate, model } => {
            let vehicle = service.create_vehicle(&plate, model).await?;
            println!("Created vehicle: {}", vehicle.label());
        }

        VehicleCommands::List { all } => {
            let vehicles = service.list_vehicles(all).await?;
            if vehicles.is_empty() {
                println!("No vehicles found.");
            } else {
                println!("{:<10} {:<30} {:<8}", "PLATE", "MODEL", "HIDDEN");
                println!("{}", "-".repeat(50));
                for vehicle in vehicles {
                    println!(
                        "{:<10} {:<30} {:<8}",
                        vehicle.plate,
                        truncate(vehicle.model.as_deref().unwrap_or("-"), 30),
                        yes_no(vehicle.is_hidden())
                    );
                }
            }
        }

        VehicleCommands::Show { plate } => {
            let vehicle = service.get_vehicle(&plate).await?;
            println!("Vehicle: {}", vehicle.plate);
            println!("  ID:       {}", vehicle.id);
            println!(
                "  Model:    {}",
                vehicle.model.as_deref().unwrap_or(NOT_SPECIFIED)
            );
            if let Some(hidden) = vehicle.hidden_at {
                println!("  Hidden:   {}", hidden.format("%Y-%m-%d %H:%M:%S"));
            }
        }

        VehicleCommands::Update { plate, model } => {
            let vehicle = service.update_vehicle(&plate, model).await?;
            println!("Updated vehicle: {}", vehicle.label());
        }

        VehicleCommands::Hide { plate } => {
            let vehicle = service.hide_vehicle(&plate).await?;
            println!("Hid vehicle: {}", vehicle.plate);
        }
    }
    Ok(())
}

async fn run_box_command(service: &CashBoxService, cmd: BoxCommands) -> Result<()> {
    match cmd {
        BoxCommands::Create {
            employee,
            company,
            destination,
            date,
            vehicle,
            note,
            opening,
        } => {
            let trip_date = match date {
                Some(date) => parse_day(&date)?,
                None => Utc::now().date_naive(),
            };
            let opening_balance = opening.as_deref().map(parse_amount).transpose()?;

            let cash_box = service
                .create_cash_box(NewCashBox {
                    employee: employee.clone(),
                    company,
                    vehicle,
                    trip_date: Some(trip_date),
                    destination,
                    note,
                    opening_balance,
                })
                .await?;
            println!(
                "Created cash box {} #{} (opening {})",
                employee,
                cash_box.number,
                format_brl_currency(cash_box.opening_balance)
            );
        }

        BoxCommands::Next { employee } => {
            let next = service.next_cash_box(&employee).await?;
            println!(
                "Next box for {}: #{} (opening {})",
                employee,
                next.number,
                format_brl_currency(next.opening_balance)
            );
        }

        BoxCommands::Edit {
            employee,
            number,
            company,
            vehicle,
            no_vehicle,
            date,
            destination,
            note,
        } => {
            let reference = CashBoxRef::new(employee, number);
            let changes = CashBoxChanges {
                company,
                vehicle: if no_vehicle {
                    Some(None)
                } else {
                    vehicle.map(Some)
                },
                trip_date: date.as_deref().map(parse_day).transpose()?,
                destination,
                note: note.map(Some),
            };
            let cash_box = service.update_cash_box(&reference, changes).await?;
            println!(
                "Updated cash box {} (closing {})",
                reference,
                format_brl_currency(cash_box.closing_balance)
            );
        }

        BoxCommands::List {
            employee,
            company,
            destination,
            from,
            to,
            all,
            page,
            per_page,
        } => {
            let filter = CashBoxFilter {
                employee,
                company,
                destination,
                from_date: from.as_deref().map(parse_day).transpose()?,
                to_date: to.as_deref().map(parse_day).transpose()?,
                include_hidden: all,
                page,
                per_page,
            };
            let page = service.list_cash_boxes(filter).await?;

            if page.items.is_empty() {
                println!("No cash boxes found.");
                return Ok(());
            }

            println!(
                "{:<20} {:>4} {:<10} {:<18} {:>12} {:>12} {:>12} {:>12} {:>12}",
                "EMPLOYEE",
                "NO",
                "DATE",
                "DESTINATION",
                "OPENING",
                "CREDITS",
                "DEBITS",
                "ADVANCES",
                "CLOSING"
            );
            println!("{}", "-".repeat(122));
            for row in &page.items {
                let cash_box = &row.cash_box;
                let hidden = if cash_box.is_hidden() { " (hidden)" } else { "" };
                println!(
                    "{:<20} {:>4} {:<10} {:<18} {:>12} {:>12} {:>12} {:>12} {:>12}{}",
                    truncate(&row.employee_name, 20),
                    cash_box.number,
                    format_date_br(cash_box.trip_date),
                    truncate(&cash_box.destination, 18),
                    format_brl(cash_box.opening_balance),
                    format_brl(row.movements.credits),
                    format_brl(row.movements.debits),
                    format_brl(row.movements.advances),
                    format_brl(closing_balance(cash_box.opening_balance, &row.movements)),
                    hidden
                );
            }
            println!("{}", "-".repeat(122));
            println!(
                "Page {} of {} ({} boxes)",
                page.page,
                page.total_pages(),
                page.total
            );
        }

        BoxCommands::Show { employee, number } => {
            let reference = CashBoxRef::new(employee, number);
            let details = service.get_cash_box_details(&reference).await?;
            let cash_box = &details.cash_box;

            println!("Cash box: {}", reference);
            println!("  ID:          {}", cash_box.id);
            println!("  Trip date:   {}", format_date_br(cash_box.trip_date));
            println!("  Destination: {}", cash_box.destination);
            println!(
                "  Company:     {}",
                details
                    .company
                    .as_ref()
                    .map_or(NOT_SPECIFIED, |c| c.name.as_str())
            );
            println!(
                "  Vehicle:     {}",
                details
                    .vehicle
                    .as_ref()
                    .map_or_else(|| NOT_SPECIFIED.to_string(), |v| v.label())
            );
            if let Some(note) = &cash_box.note {
                println!("  Note:        {}", note);
            }
            if let Some(hidden) = cash_box.hidden_at {
                println!("  Hidden:      {}", hidden.format("%Y-%m-%d %H:%M:%S"));
            }

            println!();
            if details.entries.is_empty() {
                println!("No entries.");
            } else {
                println!(
                    "{:<10} {:<12} {:<20} {:<16} {:<30} {:>12} {:>12}",
                    "DATE", "DOCUMENT", "SUPPLIER", "COST TYPE", "DESCRIPTION", "CREDIT", "DEBIT"
                );
                println!("{}", "-".repeat(118));
                for entry in &details.entries {
                    println!(
                        "{:<10} {:<12} {:<20} {:<16} {:<30} {:>12} {:>12}",
                        format_date_br(entry.date),
                        truncate(entry.document_number.as_deref().unwrap_or(""), 12),
                        truncate(entry.counterparty.as_deref().unwrap_or(""), 20),
                        truncate(entry.cost_type.as_deref().unwrap_or(""), 16),
                        truncate(entry.description.as_deref().unwrap_or(""), 30),
                        entry.credit.map(format_brl).unwrap_or_default(),
                        entry.debit.map(format_brl).unwrap_or_default(),
                    );
                }
            }

            if !details.advances.is_empty() {
                println!();
                println!("Advances:");
                for advance in &details.advances {
                    println!(
                        "  {} {:>12}  {}",
                        format_date_br(advance.date),
                        format_brl(advance.amount),
                        advance.id
                    );
                }
            }

            let movements = &details.movements;
            println!();
            println!("  Opening:     {:>14}", format_brl_currency(cash_box.opening_balance));
            println!("  Credits:     {:>14}", format_brl_currency(movements.credits));
            println!("  Advances:    {:>14}", format_brl_currency(movements.advances));
            println!("  Debits:      {:>14}", format_brl_currency(movements.debits));
            println!(
                "  Closing:     {:>14}",
                format_brl_currency(closing_balance(cash_box.opening_balance, movements))
            );
        }

        BoxCommands::Hide { employee, number } => {
            let reference = CashBoxRef::new(employee, number);
            let result = service.hide_cash_box(&reference).await?;
            println!(
                "Hid cash box {} ({} advance(s) released)",
                reference, result.released_advances
            );
        }

        BoxCommands::Entries {
            employee,
            number,
            input,
            dry_run,
            validate,
        } => {
            let reference = CashBoxRef::new(employee, number);
            run_entries_import(service, &reference, input.as_deref(), dry_run, validate).await?;
        }

        BoxCommands::AddEntry {
            employee,
            number,
            date,
            document,
            counterparty,
            cost_type,
            description,
            credit,
            debit,
        } => {
            let reference = CashBoxRef::new(employee, number);
            let entry = NewLedgerEntry {
                date: date.as_deref().map(parse_day).transpose()?,
                document_number: document,
                description,
                cost_type,
                counterparty,
                credit: credit.as_deref().map(parse_amount).transpose()?,
                debit: debit.as_deref().map(parse_amount).transpose()?,
            };
            let entry = service.add_entry(&reference, entry).await?;
            println!(
                "Added entry {} to {} ({})",
                entry.position + 1,
                reference,
                format_date_br(entry.date)
            );
        }
    }
    Ok(())
}

async fn run_entries_import(
    service: &CashBoxService,
    reference: &CashBoxRef,
    input: Option<&str>,
    dry_run: bool,
    validate: bool,
) -> Result<()> {
    use crate::io::{ImportOptions, Importer};
    use std::fs::File;
    use std::io::{stdin, Read};

    let importer = Importer::new(service);

    // Determine input reader
    let reader: Box<dyn Read> = match input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open input file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdin()),
    };

    let options = ImportOptions {
        dry_run,
        validate_only: validate,
    };
    let result = importer
        .import_entries_csv(reference, reader, options)
        .await?;

    // Display results
    if !result.is_clean() {
        println!("Import rejected, entries unchanged");
    } else if validate || dry_run {
        println!("Validation successful");
    } else {
        println!("Import complete");
    }
    println!("  Imported: {}", result.imported);
    println!("  Skipped:  {}", result.skipped);
    println!("  Errors:   {}", result.errors.len());

    if !result.errors.is_empty() {
        println!("\nErrors:");
        for error in result.errors.iter().take(10) {
            println!(
                "  Line {}: {}",
                error.line,
                error
                    .field
                    .as_ref()
                    .map(|f| format!("{}: ", f))
                    .unwrap_or_default()
                    + &error.error
            );
        }
        if result.errors.len() > 10 {
            println!("  ... and {} more errors", result.errors.len() - 10);
        }
    }

    Ok(())
}

async fn run_advance_command(service: &CashBoxService, cmd: AdvanceCommands) -> Result<()> {
    match cmd {
        AdvanceCommands::Create {
            employee,
            amount,
            date,
            note,
        } => {
            let amount = parse_amount(&amount)?;
            let date = match date {
                Some(date) => parse_day(&date)?,
                None => Utc::now().date_naive(),
            };
            let advance = service.create_advance(&employee, date, amount, note).await?;
            println!(
                "Recorded advance: {} to {} ({})",
                format_brl_currency(advance.amount),
                employee,
                advance.id
            );
        }

        AdvanceCommands::List { employee, unlinked } => {
            let advances = service.list_advances(employee.as_deref(), unlinked).await?;
            if advances.is_empty() {
                println!("No advances found.");
            } else {
                println!(
                    "{:<36} {:<10} {:>12} {:<8} {:<30}",
                    "ID", "DATE", "AMOUNT", "LINKED", "NOTE"
                );
                println!("{}", "-".repeat(100));
                for advance in advances {
                    println!(
                        "{:<36} {:<10} {:>12} {:<8} {:<30}",
                        advance.id,
                        format_date_br(advance.date),
                        format_brl(advance.amount),
                        yes_no(advance.is_linked()),
                        truncate(advance.note.as_deref().unwrap_or(""), 30)
                    );
                }
            }
        }

        AdvanceCommands::Edit {
            id,
            amount,
            date,
            note,
        } => {
            let changes = AdvanceChanges {
                date: date.as_deref().map(parse_day).transpose()?,
                amount: amount.as_deref().map(parse_amount).transpose()?,
                note: note.map(Some),
            };
            let advance = service.update_advance(parse_id(&id)?, changes).await?;
            println!(
                "Updated advance {} ({})",
                advance.id,
                format_brl_currency(advance.amount)
            );
        }

        AdvanceCommands::Delete { id } => {
            let advance = service.delete_advance(parse_id(&id)?).await?;
            println!("Deleted advance {}", advance.id);
        }

        AdvanceCommands::Link {
            id,
            employee,
            number,
        } => {
            let reference = CashBoxRef::new(employee, number);
            let advance = service.link_advance(parse_id(&id)?, &reference).await?;
            println!("Linked advance {} to {}", advance.id, reference);
        }

        AdvanceCommands::Unlink { id } => {
            let advance = service.unlink_advance(parse_id(&id)?).await?;
            println!("Unlinked advance {}", advance.id);
        }
    }
    Ok(())
}

async fn run_recalc_command(service: &CashBoxService, employee: Option<&str>) -> Result<()> {
    let report = service.recalculate_balances(employee).await?;

    if report.employees.is_empty() {
        println!("No cash boxes to recalculate.");
        return Ok(());
    }

    println!("{:<30} {:>6} {:>14}", "EMPLOYEE", "BOXES", "BALANCE");
    println!("{}", "-".repeat(52));
    for item in &report.employees {
        match &item.outcome {
            Ok(updates) => {
                let balance: Cents = updates.last().map_or(0, |u| u.closing_balance);
                println!(
                    "{:<30} {:>6} {:>14}",
                    truncate(&item.employee_name, 30),
                    updates.len(),
                    format_brl(balance)
                );
            }
            Err(error) => {
                println!(
                    "{:<30} {:>6} {}",
                    truncate(&item.employee_name, 30),
                    "!",
                    error
                );
            }
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        anyhow::bail!("Recalculation failed for {} employee(s)", failed);
    }
    Ok(())
}

async fn run_export_command(
    service: &CashBoxService,
    export_type: &str,
    output: Option<&str>,
    reference: Option<CashBoxRef>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    // Determine output writer
    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "boxes" => {
            let count = exporter.export_cash_boxes_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} cash boxes", count);
            }
        }
        "advances" => {
            let count = exporter.export_advances_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} advances", count);
            }
        }
        "entries" => {
            let reference = reference
                .context("The entries export needs --employee and --number")?;
            let count = exporter.export_entries_csv(&reference, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} entries of {}", count, reference);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} companies, {} employees, {} vehicles, {} cash boxes, {} entries, {} advances",
                    snapshot.companies.len(),
                    snapshot.employees.len(),
                    snapshot.vehicles.len(),
                    snapshot.cash_boxes.len(),
                    snapshot.entries.len(),
                    snapshot.advances.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: boxes, advances, entries, full",
                export_type
            );
        }
    }

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn parse_amount(input: &str) -> Result<Cents> {
    parse_cents(input)
        .with_context(|| format!("Invalid amount '{}'. Use '1.234,56' or '1234.56'", input))
}

fn parse_day(input: &str) -> Result<NaiveDate> {
    Ok(parse_date(input)?)
}

fn parse_id(input: &str) -> Result<Uuid> {
    Uuid::parse_str(input).context("Invalid advance ID format (expected UUID)")
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_box_list() {
        let cli = Cli::try_parse_from([
            "caixa",
            "box",
            "list",
            "--employee",
            "Maria",
            "--page",
            "2",
            "--per-page",
            "10",
        ])
        .unwrap();

        match cli.command {
            Commands::CashBox(BoxCommands::List {
                employee,
                page,
                per_page,
                ..
            }) => {
                assert_eq!(employee.as_deref(), Some("Maria"));
                assert_eq!(page, 2);
                assert_eq!(per_page, Some(10));
            }
            _ => panic!("expected box list"),
        }
    }

    #[test]
    fn test_amount_and_date_helpers() {
        assert_eq!(parse_amount("1.234,56").unwrap(), 123456);
        assert!(parse_amount("doze").is_err());
        assert_eq!(
            parse_day("05/03/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
    }
}
