use std::io;
use std::path::PathBuf;

use clap::Parser;

use pcfg::{back_map, load_grammar, parse, to_near_cnf, Grammar};

#[derive(Parser, Debug)]
#[command(name = "pcfg", about = "Near-CNF conversion and probabilistic CKY parsing for PCFGs", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Check that every variable's rule probabilities sum to 1.
    Validate(GrammarArgs),
    /// Convert a grammar to near-CNF and print the result.
    Convert(GrammarArgs),
    /// Parse a sentence and print its best tree and probability.
    Parse(ParseArgs),
}

#[derive(Parser, Debug)]
struct GrammarArgs {
    /// Grammar file, one `LHS -> SYM SYM .. PROB` rule per line.
    grammar: PathBuf,
}

#[derive(Parser, Debug)]
struct ParseArgs {
    /// Grammar file, one `LHS -> SYM SYM .. PROB` rule per line.
    grammar: PathBuf,
    /// The sentence to parse, given as space-separated tokens.
    sentence: Vec<String>,
    /// Print the raw tree over the converted grammar instead of
    /// mapping auxiliary nodes back out.
    #[arg(long)]
    keep_cnf: bool,
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Validate(args) => {
            let grammar = load_grammar(&args.grammar)?;
            if grammar.is_valid() {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }
        Commands::Convert(args) => {
            let grammar = load_grammar(&args.grammar)?;
            let (cnf, _) = to_near_cnf(&grammar);
            print_grammar(&cnf);
        }
        Commands::Parse(args) => {
            let grammar = load_grammar(&args.grammar)?;
            if !grammar.is_valid() {
                eprintln!("Warning: rule probabilities do not sum to 1 per variable");
            }
            let (cnf, changes) = to_near_cnf(&grammar);
            match parse(&cnf, &args.sentence) {
                Some(tree) => {
                    let tree = if args.keep_cnf { tree } else { back_map(tree, &changes) };
                    println!("{}", tree);
                }
                None => {
                    println!("(NOPARSE {})", args.sentence.join(" "));
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}

fn print_grammar(grammar: &Grammar) {
    println!("# start: {}", grammar.start);
    let mut variables: Vec<&String> = grammar.rules.keys().collect();
    variables.sort();
    for variable in variables {
        for rule in grammar.rules_for(variable) {
            println!("{}", rule);
        }
    }
}
