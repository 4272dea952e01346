use locksmith_job_sync::app;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    app::start().await
}
