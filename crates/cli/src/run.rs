use std::{
    fs,
    io::{Read, Write},
};

use tfgraph_core::{
    selector::parse_selectors, tensor::TensorError, GraphDef, GraphFormat, NodeDef, Tensor,
};
use tfgraph_session::{run_constant_node, Engine, GraphDefExt, SessionError};

use crate::{
    opt::{GraphCmd, InputOpt, NodeCmd, Opt, OutputFormat, OutputOpt, TensorCmd},
    CliError,
};

/// Executes one command. `stdin` and `stdout` back the `-` filenames.
pub fn run<E: Engine>(
    opt: Opt,
    engine: &E,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
) -> Result<(), CliError> {
    let mut io = Io { stdin, stdout };

    match opt {
        Opt::Graph(GraphCmd::Decode {
            input,
            output,
            add_prefix,
        }) => {
            let mut graph = io.read_graph(&input)?;
            if let Some(prefix) = add_prefix.filter(|p| !p.is_empty()) {
                graph.apply_prefix(engine, &prefix)?;
            }
            io.write_graph(&graph, &output)
        }

        Opt::Graph(GraphCmd::Merge {
            input_filenames,
            inputs,
            output,
        }) => {
            let mut graph = new_graph(engine)?;
            for path in input_filenames.iter().chain(&inputs) {
                let other = io.read_graph_from(path)?;
                log::debug!("Merging {path} ({} nodes)", other.nodes().len());
                graph.append(other)?;
            }
            io.write_graph(&graph, &output)
        }

        Opt::Node(NodeCmd::List { input, selectors }) => {
            let graph = io.read_graph(&input)?;
            let filters = parse_selectors(&selectors)?;
            let names = graph.list_nodes(&filters);
            serde_json::to_writer_pretty(&mut *io.stdout, &names)?;
            writeln!(io.stdout)?;
            Ok(())
        }

        Opt::Node(NodeCmd::Get {
            name,
            input,
            output,
        }) => {
            let node = io.read_graph(&input)?.get_node(&name)?.clone();
            let mut graph = new_graph(engine)?;
            graph.set_nodes([node]);
            io.write_graph(&graph, &output)
        }

        Opt::Node(NodeCmd::Delete {
            names,
            input,
            output,
        }) => {
            let mut graph = io.read_graph(&input)?;
            graph.delete_nodes(&names)?;
            io.write_graph(&graph, &output)
        }

        Opt::Node(NodeCmd::Rename {
            name,
            new_name,
            input,
            output,
        }) => {
            let mut graph = io.read_graph(&input)?;
            graph.rename_node(&name, &new_name)?;
            io.write_graph(&graph, &output)
        }

        Opt::Node(NodeCmd::Run { name, input }) => {
            let graph = io.read_graph(&input)?;
            let tensor = run_constant_node(&graph, engine, &name)?;
            serde_json::to_writer(&mut *io.stdout, &tensor)?;
            writeln!(io.stdout)?;
            Ok(())
        }

        Opt::Tensor(TensorCmd::Encode {
            name,
            input,
            output,
        }) => {
            let tensor: Tensor = serde_json::from_slice(&io.read(input.path()?)?)
                .map_err(TensorError::from)?;
            let mut graph = new_graph(engine)?;
            graph.set_nodes([NodeDef::constant(name, &tensor)?]);
            io.write_graph(&graph, &output)
        }
    }
}

/// An empty graph stamped with the engine's versions, or a bare one when no
/// engine is available.
fn new_graph<E: Engine>(engine: &E) -> Result<GraphDef, CliError> {
    match GraphDef::new_with_versions(engine) {
        Ok(graph) => Ok(graph),
        Err(SessionError::Unsupported(e)) => {
            log::warn!("Creating a graph without version information: {e}");
            Ok(GraphDef::default())
        }
        Err(e) => Err(e.into()),
    }
}

struct Io<'a> {
    stdin: &'a mut dyn Read,
    stdout: &'a mut dyn Write,
}

impl Io<'_> {
    fn read(&mut self, path: &str) -> Result<Vec<u8>, CliError> {
        if path == "-" {
            let mut buf = vec![];
            self.stdin.read_to_end(&mut buf)?;
            Ok(buf)
        } else {
            Ok(fs::read(path)?)
        }
    }

    fn read_graph(&mut self, input: &InputOpt) -> Result<GraphDef, CliError> {
        self.read_graph_from(input.path()?)
    }

    fn read_graph_from(&mut self, path: &str) -> Result<GraphDef, CliError> {
        if path == "-" {
            let buf = self.read(path)?;
            Ok(GraphDef::from_bytes(&buf, None)?)
        } else {
            Ok(GraphDef::load(path)?)
        }
    }

    fn write_graph(&mut self, graph: &GraphDef, output: &OutputOpt) -> Result<(), CliError> {
        let buf = match output.output_format {
            OutputFormat::Pb => graph.to_bytes(GraphFormat::Binary)?,
            OutputFormat::Pbtxt => graph.to_bytes(GraphFormat::Text)?,
            OutputFormat::Json => graph.to_bytes(GraphFormat::Json)?,
            OutputFormat::Dot => graph.to_dot().into_bytes(),
        };

        if output.output_filename == "-" {
            self.stdout.write_all(&buf)?;
        } else {
            fs::write(&output.output_filename, buf)?;
        }
        Ok(())
    }
}
