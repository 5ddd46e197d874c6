use prom2tsdb_exporter::cli;

#[tokio::main]
async fn main() {
    let code = cli::run(std::env::args_os()).await;
    std::process::exit(code);
}
