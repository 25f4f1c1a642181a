//! Command-line surface of `fleet-inspect`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::Config;
use crate::db::{create_pool, UserContext};
use crate::error::AppError;
use crate::export::LayoutOptions;
use crate::models::checklist::summarize;
use crate::models::{ChecklistDefinition, DriverPatch, NewDriver};
use crate::registry::Backend;
use crate::services::{
    parse_mileage, ExportService, InspectionForm, InspectionService, SyncService,
};

#[derive(Parser, Debug)]
#[command(name = "fleet-inspect", version, about = "Vehicle inspection records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Vehicle registry
    Vehicles(VehiclesArgs),
    /// Driver registry
    Drivers(DriversArgs),
    /// Inspection records (create/list/export/sync)
    Inspections(InspectionsArgs),
    /// Checklist definition in use
    Checklist(ChecklistArgs),
}

#[derive(Parser, Debug)]
pub struct VehiclesArgs {
    #[command(subcommand)]
    pub action: VehiclesCmd,
}

#[derive(Subcommand, Debug)]
pub enum VehiclesCmd {
    /// Create a vehicle or overwrite an existing one
    Add {
        #[arg(long)]
        registration: String,
        #[arg(long)]
        make: String,
        #[arg(long)]
        model: String,
        #[arg(long, default_value = "")]
        mileage: String,
    },
    /// List all vehicles
    List,
    /// Vehicles whose registration contains the query
    Search { query: String },
    /// Show one vehicle
    Show { registration: String },
    /// Record a new odometer reading
    SetMileage { registration: String, mileage: String },
    /// Delete a vehicle
    Remove { registration: String },
}

#[derive(Parser, Debug)]
pub struct DriversArgs {
    #[command(subcommand)]
    pub action: DriversCmd,
}

#[derive(Subcommand, Debug)]
pub enum DriversCmd {
    /// Add a driver
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        license: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// List drivers by name
    List,
    /// Show one driver
    Show { id: String },
    /// Change fields of a driver; an empty value clears license/phone
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        license: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Delete a driver; saved inspections keep the name
    Remove { id: String },
}

#[derive(Parser, Debug)]
pub struct InspectionsArgs {
    #[command(subcommand)]
    pub action: InspectionsCmd,
}

#[derive(Subcommand, Debug)]
pub enum InspectionsCmd {
    /// Save an inspection from a JSON form file
    New {
        form: PathBuf,
        /// Also export the saved record as PDF
        #[arg(long, default_value_t = false)]
        export: bool,
    },
    /// List inspections, newest first
    List {
        /// Only records not yet pushed to the cloud
        #[arg(long, default_value_t = false)]
        unsynced: bool,
    },
    /// Show one inspection
    Show { id: String },
    /// Export an inspection as PDF
    Export {
        #[arg(required_unless_present = "form")]
        id: Option<String>,
        /// Export a form file directly without saving it
        #[arg(long, conflicts_with = "id")]
        form: Option<PathBuf>,
        /// Output directory (defaults to EXPORT_DIR)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete an inspection
    Remove { id: String },
    /// Push unsynced local inspections to the cloud database
    Sync,
}

#[derive(Parser, Debug)]
pub struct ChecklistArgs {
    #[command(subcommand)]
    pub action: ChecklistCmd,
}

#[derive(Subcommand, Debug)]
pub enum ChecklistCmd {
    /// Print the checklist definition
    Show,
    /// Print an empty inspection form to fill in
    Template,
}

/// Everything a command needs, resolved once at startup.
pub struct App {
    pub config: Config,
    pub backend: Backend,
    pub ctx: UserContext,
    pub definition: ChecklistDefinition,
}

impl App {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend = Backend::from_config(&config).await?;
        let definition = match &config.checklist_path {
            Some(path) => ChecklistDefinition::load(path).await?,
            None => ChecklistDefinition::builtin()?,
        };
        let ctx = UserContext::new(config.user_id.clone(), config.inspector_name.clone());
        Ok(Self {
            config,
            backend,
            ctx,
            definition,
        })
    }

    fn inspections(&self) -> InspectionService {
        InspectionService::new(self.backend.clone(), self.definition.clone())
    }

    fn exporter(&self) -> ExportService {
        ExportService::new(LayoutOptions {
            timezone: self.config.display_timezone,
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{}", out);
    Ok(())
}

async fn read_form(path: &Path) -> anyhow::Result<InspectionForm> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read form {}", path.display()))?;
    let form = serde_json::from_str(&json)
        .with_context(|| format!("invalid form {}", path.display()))?;
    Ok(form)
}

/// Process exit code for a failed command: 2 when the input can be corrected
/// and the command retried, 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<AppError>() {
        Some(e) if e.is_recoverable() => 2,
        _ => 1,
    }
}

pub async fn run(app: &App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Vehicles(args) => vehicles(app, args.action).await,
        Commands::Drivers(args) => drivers(app, args.action).await,
        Commands::Inspections(args) => inspections(app, args.action).await,
        Commands::Checklist(args) => checklist(app, args.action),
    }
}

async fn vehicles(app: &App, cmd: VehiclesCmd) -> anyhow::Result<()> {
    let registry = &app.backend.vehicles;
    let ctx = &app.ctx;
    match cmd {
        VehiclesCmd::Add {
            registration,
            make,
            model,
            mileage,
        } => {
            let mileage = parse_mileage(&mileage)?;
            let vehicle = registry
                .upsert(ctx, &registration, &make, &model, mileage)
                .await?;
            print_json(&vehicle)
        }
        VehiclesCmd::List => print_json(&registry.list(ctx).await?),
        VehiclesCmd::Search { query } => print_json(&registry.search(ctx, &query).await?),
        VehiclesCmd::Show { registration } => {
            let vehicle = registry
                .get(ctx, &registration)
                .await?
                .ok_or_else(|| AppError::not_found(format!("vehicle {}", registration)))?;
            print_json(&vehicle)
        }
        VehiclesCmd::SetMileage {
            registration,
            mileage,
        } => {
            let mileage = parse_mileage(&mileage)?;
            let vehicle = registry
                .set_mileage(ctx, &registration, mileage)
                .await?
                .ok_or_else(|| AppError::not_found(format!("vehicle {}", registration)))?;
            print_json(&vehicle)
        }
        VehiclesCmd::Remove { registration } => {
            registry.remove(ctx, &registration).await?;
            Ok(())
        }
    }
}

async fn drivers(app: &App, cmd: DriversCmd) -> anyhow::Result<()> {
    let registry = &app.backend.drivers;
    let ctx = &app.ctx;
    match cmd {
        DriversCmd::Add {
            name,
            license,
            phone,
        } => {
            let driver = registry
                .add(
                    ctx,
                    NewDriver {
                        name,
                        license,
                        phone,
                    },
                )
                .await?;
            print_json(&driver)
        }
        DriversCmd::List => print_json(&registry.list(ctx).await?),
        DriversCmd::Show { id } => {
            let driver = registry
                .get(ctx, &id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("driver {}", id)))?;
            print_json(&driver)
        }
        DriversCmd::Update {
            id,
            name,
            license,
            phone,
        } => {
            let driver = registry
                .update(
                    ctx,
                    &id,
                    DriverPatch {
                        name,
                        license,
                        phone,
                    },
                )
                .await?;
            print_json(&driver)
        }
        DriversCmd::Remove { id } => {
            registry.remove(ctx, &id).await?;
            Ok(())
        }
    }
}

async fn inspections(app: &App, cmd: InspectionsCmd) -> anyhow::Result<()> {
    let service = app.inspections();
    let ctx = &app.ctx;
    match cmd {
        InspectionsCmd::New { form, export } => {
            let form = read_form(&form).await?;
            // compare against the reading stored before this save
            let mileage = parse_mileage(&form.vehicle.mileage)?;
            if let Some(reminder) = service
                .service_due(ctx, &form.vehicle.registration, mileage)
                .await?
            {
                eprintln!(
                    "Service due soon: {} is {} km past the last recorded {} km",
                    reminder.registration,
                    reminder.distance(),
                    reminder.last_known
                );
            }

            let record = service.save(ctx, form).await?;
            if export {
                let path = app.exporter().export(&record, &app.config.export_dir).await?;
                eprintln!("Exported {}", path.display());
            }
            print_json(&record)
        }
        InspectionsCmd::List { unsynced } => {
            let mut records = service.list(ctx).await?;
            if unsynced {
                records.retain(|r| !r.synced);
            }
            print_json(&records)
        }
        InspectionsCmd::Show { id } => {
            let record = service.get(ctx, &id).await?;
            print_json(&serde_json::json!({
                "record": record,
                "summary": summarize(&record.checklist),
            }))
        }
        InspectionsCmd::Export { id, form, out } => {
            let record = match (id, form) {
                (Some(id), _) => service.get(ctx, &id).await?,
                (None, Some(path)) => service.build_record(ctx, read_form(&path).await?).await?,
                (None, None) => bail!("an inspection id or --form is required"),
            };
            let dir = out.unwrap_or_else(|| app.config.export_dir.clone());
            let path = app.exporter().export(&record, &dir).await?;
            println!("{}", path.display());
            Ok(())
        }
        InspectionsCmd::Remove { id } => {
            service.remove(ctx, &id).await?;
            Ok(())
        }
        InspectionsCmd::Sync => {
            if app.backend.mode.is_durable() {
                bail!("already writing to the cloud database, nothing to sync");
            }
            let pool = create_pool(app.config.require_database_url()?).await?;
            let sync = SyncService::new(app.backend.clone(), Backend::cloud(pool));
            let report = sync.push_unsynced(ctx).await?;
            print_json(&report)
        }
    }
}

fn checklist(app: &App, cmd: ChecklistCmd) -> anyhow::Result<()> {
    match cmd {
        ChecklistCmd::Show => print_json(&app.definition),
        ChecklistCmd::Template => {
            let types = app.definition.inspection_types();
            print_json(&serde_json::json!({
                "vehicle": {
                    "registration": "",
                    "make": "",
                    "model": "",
                    "mileage": "",
                },
                "inspectionType": types.first().map(|t| t.as_str()),
                "checklist": app.inspections().new_checklist(),
                "generalComments": "",
                "driverId": null,
                "signatureDataUrl": null,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_inspection_export() {
        let cli = Cli::try_parse_from(["fleet-inspect", "inspections", "export", "abc", "--out", "/tmp/x"])
            .unwrap();
        match cli.command {
            Commands::Inspections(InspectionsArgs {
                action: InspectionsCmd::Export { id, form, out },
            }) => {
                assert_eq!(id.as_deref(), Some("abc"));
                assert!(form.is_none());
                assert_eq!(out, Some(PathBuf::from("/tmp/x")));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["fleet-inspect", "inspections", "export"]).is_err());
        assert!(Cli::try_parse_from([
            "fleet-inspect",
            "inspections",
            "export",
            "abc",
            "--form",
            "f.json"
        ])
        .is_err());
    }

    #[test]
    fn test_parse_vehicle_set_mileage() {
        let cli =
            Cli::try_parse_from(["fleet-inspect", "vehicles", "set-mileage", "ABC123", "61000"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Vehicles(VehiclesArgs {
                action: VehiclesCmd::SetMileage { .. }
            })
        ));
    }

    #[test]
    fn test_exit_code_separates_input_errors() {
        let input = anyhow::Error::from(AppError::validation("vehicle make required"));
        assert_eq!(exit_code(&input), 2);
        let missing = anyhow::Error::from(AppError::not_found("driver d-1"));
        assert_eq!(exit_code(&missing), 2);
        let storage = anyhow::Error::from(AppError::Storage("disk full".to_string()));
        assert_eq!(exit_code(&storage), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("failed to read form")), 1);
    }

    #[tokio::test]
    async fn test_template_form_round_trips_into_a_record() {
        let app = App {
            config: test_config(),
            backend: Backend::memory(),
            ctx: UserContext::anonymous(),
            definition: ChecklistDefinition::builtin().unwrap(),
        };
        let template = serde_json::json!({
            "vehicle": {"registration": "abc123", "make": "Toyota", "model": "Corolla", "mileage": ""},
            "checklist": app.inspections().new_checklist(),
        });
        let form: InspectionForm = serde_json::from_value(template).unwrap();
        let record = app.inspections().save(&app.ctx, form).await.unwrap();
        assert_eq!(record.vehicle.registration, "ABC123");
    }

    fn test_config() -> Config {
        Config {
            storage_mode: crate::config::StorageMode::Memory,
            data_dir: PathBuf::from("./data"),
            database_url: None,
            user_id: crate::db::DEFAULT_USER_ID.to_string(),
            inspector_name: None,
            checklist_path: None,
            export_dir: PathBuf::from("./exports"),
            display_timezone: chrono_tz::Tz::UTC,
        }
    }
}
