use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use layout::{Document, Layout};
use runtime::codec;
use shared::protocol::Value;

#[derive(Parser, Debug)]
#[command(name = "surface-tools", about = "Inspect control-surface layout documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a layout document can start a session.
    Validate { layout: PathBuf },
    /// List every widget with its address and declared targets.
    Addresses { layout: PathBuf },
    /// Dry-run the codec: print the messages a widget emits for a value.
    Encode {
        layout: PathBuf,
        #[arg(long)]
        widget: String,
        /// Scalar value, or one comma-separated value per cell.
        #[arg(long, value_delimiter = ',')]
        value: Vec<f64>,
    },
}

fn compile(path: &PathBuf) -> Result<Layout> {
    let document = Document::load(path)?;
    Ok(Layout::compile(&document)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Validate { layout } => {
            let compiled = compile(&layout)?;
            println!("ok: {} widgets", compiled.widgets().len());
        }
        Command::Addresses { layout } => {
            let compiled = compile(&layout)?;
            for widget in compiled.widgets() {
                let targets = if widget.targets.is_empty() {
                    "(broadcast)".to_string()
                } else {
                    widget
                        .targets
                        .iter()
                        .map(|target| target.as_str())
                        .collect::<Vec<_>>()
                        .join(",")
                };
                println!(
                    "{:<20} {:<32} {}",
                    widget.id.as_str(),
                    widget.address.raw(),
                    targets
                );
            }
        }
        Command::Encode {
            layout,
            widget,
            value,
        } => {
            let compiled = compile(&layout)?;
            let Some(descriptor) = compiled.find(&widget.as_str().into()) else {
                bail!("no widget with id {widget:?}");
            };
            let value = match value.as_slice() {
                [] => bail!("--value needs at least one number"),
                [scalar] if !descriptor.is_vector() => Value::Scalar(*scalar),
                cells => Value::Vector(cells.to_vec()),
            };
            for message in codec::encode(descriptor, &value) {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
    }

    Ok(())
}
