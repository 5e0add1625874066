use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::SessionService;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{current_principal, health_check, login, refresh};

pub fn run(listener: TcpListener, sessions: SessionService) -> Result<Server, std::io::Error> {
    let jwt_config = sessions.jwt_settings().clone();
    let sessions = web::Data::new(sessions);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .app_data(sessions.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            // Protected routes (require a valid access token)
            .service(
                web::scope("/api")
                    .wrap(JwtMiddleware::new(jwt_config.clone()))
                    .route("/me", web::get().to(current_principal)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
