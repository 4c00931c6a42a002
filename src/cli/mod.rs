use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Software MIDI master clock", long_about = None)]
pub struct Args {
    /// Rule files to load from ./rules (".json" may be omitted)
    #[arg(value_name = "RULE_FILE")]
    pub rule_files: Vec<String>,

    /// Also send the clock to a virtual output port
    #[arg(long)]
    pub virtual_port: bool,

    /// Name of the virtual output port (implies --virtual-port)
    #[arg(long, value_name = "NAME")]
    pub vp_out: Option<String>,

    /// Open every output port whose name contains SUBSTR (repeatable)
    #[arg(long = "output", value_name = "SUBSTR")]
    pub outputs: Vec<String>,

    /// List available MIDI ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Path to the JSON configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Initial tempo, overriding config and rule files
    #[arg(long, value_name = "BPM")]
    pub bpm: Option<f64>,
}

impl Args {
    /// The virtual port to open, if any.
    pub fn virtual_port_name(&self, default_name: &str) -> Option<String> {
        match (&self.vp_out, self.virtual_port) {
            (Some(name), _) => Some(name.clone()),
            (None, true) => Some(default_name.to_string()),
            (None, false) => None,
        }
    }
}

/// Every port name containing `substring`, case-insensitively.
pub fn matching_ports<'a>(substring: &str, ports: &'a [String]) -> Vec<&'a str> {
    let needle = substring.to_lowercase();
    ports
        .iter()
        .filter(|p| p.to_lowercase().contains(&needle))
        .map(String::as_str)
        .collect()
}

pub fn format_port_list(title: &str, ports: &[String]) -> String {
    let mut out = format!("{}:\n", title);
    if ports.is_empty() {
        out.push_str("  (none)\n");
    }
    for (i, port) in ports.iter().enumerate() {
        out.push_str(&format!("  {}: {}\n", i, port));
    }
    out
}
