use std::str::FromStr;

use structopt::StructOpt;

use crate::CliError;

#[derive(Debug, StructOpt)]
#[structopt(name = "tf-graph-tool", about = "Inspect and edit TensorFlow graph definitions")]
pub enum Opt {
    /// Graph encode and decode commands
    Graph(GraphCmd),
    /// Node related commands
    Node(NodeCmd),
    /// Tensor commands
    Tensor(TensorCmd),
}

#[derive(Debug, StructOpt)]
pub enum GraphCmd {
    /// Decode a graph from one format to another
    Decode {
        #[structopt(flatten)]
        input: InputOpt,

        #[structopt(flatten)]
        output: OutputOpt,

        #[structopt(long = "add-prefix", help = "Prefix for all node names of the output graph")]
        add_prefix: Option<String>,
    },

    /// Merge input graphs into one
    Merge {
        #[structopt(
            long = "input-filename",
            number_of_values = 1,
            help = "Input graph filenames (- for stdin)"
        )]
        input_filenames: Vec<String>,

        #[structopt(name = "INPUTS")]
        inputs: Vec<String>,

        #[structopt(flatten)]
        output: OutputOpt,
    },
}

#[derive(Debug, StructOpt)]
pub enum NodeCmd {
    /// List node names, optionally filtered by selectors
    List {
        #[structopt(flatten)]
        input: InputOpt,

        #[structopt(
            long = "selector",
            number_of_values = 1,
            help = "Selector in key=value format (keys: op, operation, input)"
        )]
        selectors: Vec<String>,
    },

    /// Print a graph containing a single node
    Get {
        #[structopt(long = "name")]
        name: String,

        #[structopt(flatten)]
        input: InputOpt,

        #[structopt(flatten)]
        output: OutputOpt,
    },

    /// Delete nodes from a graph
    Delete {
        #[structopt(long = "name", number_of_values = 1)]
        names: Vec<String>,

        #[structopt(flatten)]
        input: InputOpt,

        #[structopt(flatten)]
        output: OutputOpt,
    },

    /// Rename a node
    Rename {
        #[structopt(long = "name")]
        name: String,

        #[structopt(long = "new-name")]
        new_name: String,

        #[structopt(flatten)]
        input: InputOpt,

        #[structopt(flatten)]
        output: OutputOpt,
    },

    /// Print the value of a constant node as a JSON tensor
    Run {
        #[structopt(long = "name")]
        name: String,

        #[structopt(flatten)]
        input: InputOpt,
    },
}

#[derive(Debug, StructOpt)]
pub enum TensorCmd {
    /// Encode a JSON tensor as a constant node
    Encode {
        #[structopt(long = "name")]
        name: String,

        #[structopt(flatten)]
        input: InputOpt,

        #[structopt(flatten)]
        output: OutputOpt,
    },
}

#[derive(Debug, StructOpt)]
pub struct InputOpt {
    #[structopt(long = "input-filename", help = "Input filename (- for stdin)")]
    pub input_filename: Option<String>,

    #[structopt(name = "INPUT")]
    pub input: Option<String>,
}

impl InputOpt {
    pub fn path(&self) -> Result<&str, CliError> {
        self.input_filename
            .as_deref()
            .or(self.input.as_deref())
            .ok_or(CliError::MissingInput)
    }
}

#[derive(Debug, StructOpt)]
pub struct OutputOpt {
    #[structopt(
        long = "output-filename",
        default_value = "-",
        help = "Output filename (- for stdout)"
    )]
    pub output_filename: String,

    #[structopt(
        long = "output-format",
        default_value = "json",
        help = "Output format: pb, pbtxt, json or dot"
    )]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pb,
    Pbtxt,
    Json,
    Dot,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pb" => Ok(Self::Pb),
            "pbtxt" | "pbtext" => Ok(Self::Pbtxt),
            "json" => Ok(Self::Json),
            "dot" => Ok(Self::Dot),
            _ => Err(CliError::OutputFormat(s.to_string())),
        }
    }
}

#[test]
fn parse_output_formats() {
    assert_eq!("PBTEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Pbtxt);
    assert_eq!("dot".parse::<OutputFormat>().unwrap(), OutputFormat::Dot);
    assert!(matches!(
        "yaml".parse::<OutputFormat>(),
        Err(CliError::OutputFormat(f)) if f == "yaml"
    ));
}

#[test]
fn parse_args() {
    let opt = Opt::from_iter([
        "tf-graph-tool",
        "node",
        "delete",
        "--name",
        "a",
        "--name",
        "b",
        "g.pb",
        "--output-format",
        "pbtxt",
    ]);
    match opt {
        Opt::Node(NodeCmd::Delete {
            names,
            input,
            output,
        }) => {
            assert_eq!(names, ["a", "b"]);
            assert_eq!(input.path().unwrap(), "g.pb");
            assert_eq!(output.output_filename, "-");
            assert_eq!(output.output_format, OutputFormat::Pbtxt);
        }
        opt => panic!("unexpected {opt:?}"),
    }
}
