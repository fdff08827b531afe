#[tokio::main]
async fn main() {
  if let Err(e) = run_coach_lib::run().await {
    eprintln!("run-coach failed: {}", e);
    std::process::exit(1);
  }
}
