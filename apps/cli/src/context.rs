use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	Human,
	Json,
}

pub struct Context {
	pub format: OutputFormat,
}

impl Context {
	pub const fn new(format: OutputFormat) -> Self {
		Self { format }
	}

	/// Prints `output` as pretty JSON, or through `human` otherwise.
	pub fn print<T: Serialize>(&self, output: &T, human: impl FnOnce(&T)) -> anyhow::Result<()> {
		match self.format {
			OutputFormat::Human => human(output),
			OutputFormat::Json => println!("{}", serde_json::to_string_pretty(output)?),
		}

		Ok(())
	}
}
