// Pipeline trigger Lambda entry point
//
// Deployed as `bootstrap` on provided.al2023. lambda_runtime drives the tokio
// runtime, so we use #[tokio::main]

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    learn_infra_lambda::init_tracing();
    learn_infra_lambda::run_trigger().await
}
