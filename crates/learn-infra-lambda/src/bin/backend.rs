// Backend joke proxy Lambda entry point

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    learn_infra_lambda::init_tracing();
    learn_infra_lambda::run_backend().await
}
