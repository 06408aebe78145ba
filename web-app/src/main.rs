#![allow(clippy::no_effect_underscore_binding)]
use chrono::Utc;
use rocket::{
    fairing::AdHoc,
    form::Form,
    http::Status,
    request::Outcome,
    response::{content::RawCss, Flash, Redirect},
    Build, Either, Request, Rocket, State,
};
use shared::validation::Field;

use config::AppConfig;
use database::fairing::DatabaseFairing;
use error::Error;
use export::ExportFile;
use query::RecordQuery;
use screens::{
    entry::{self, EntryScreen},
    export::ExportScreen,
};
use submit::Submitter;
use templates::{PageRenderer, TemplateFairing, Webpage};

mod config;
mod database;
mod error;
mod export;
mod migrator;
mod query;
mod screens;
mod submit;
mod templates;

#[macro_use]
extern crate rocket;

#[get("/style.css")]
async fn get_style(renderer: PageRenderer<'_>) -> RawCss<String> {
    renderer.style().await
}

#[get("/?<lote>")]
async fn index(lote: Option<&str>, mut renderer: PageRenderer<'_>) -> Result<Webpage, Error> {
    let mut screen = EntryScreen::new();
    if let Some(lote) = lote {
        screen.select_batch(lote);
    }
    renderer.entry(&screen).await
}

/// Raw values of the pre-registration form, keyed by the names the backend uses.
#[derive(Debug, FromForm)]
struct DraftForm<'r> {
    lote: Option<&'r str>,
    nombre: Option<&'r str>,
    apellido: Option<&'r str>,
    dni: Option<&'r str>,
    sexo: Option<&'r str>,
    vencimiento_licencia: Option<&'r str>,
    patente: Option<&'r str>,
    marca: Option<&'r str>,
    modelo: Option<&'r str>,
    aseguradora: Option<&'r str>,
    poliza: Option<&'r str>,
    vencimiento_poliza: Option<&'r str>,
    registrado_anteriormente: Option<&'r str>,
}

impl<'r> DraftForm<'r> {
    fn values(&self) -> [(Field, &'r str); 13] {
        [
            (Field::Batch, self.lote),
            (Field::FirstName, self.nombre),
            (Field::LastName, self.apellido),
            (Field::NationalId, self.dni),
            (Field::Sex, self.sexo),
            (Field::LicenseExpiry, self.vencimiento_licencia),
            (Field::Plate, self.patente),
            (Field::Make, self.marca),
            (Field::Model, self.modelo),
            (Field::Insurer, self.aseguradora),
            (Field::PolicyNumber, self.poliza),
            (Field::PolicyExpiry, self.vencimiento_poliza),
            (Field::PriorRegistration, self.registrado_anteriormente),
        ]
        .map(|(field, value)| (field, value.unwrap_or_default()))
    }
}

#[post("/", data = "<form>")]
async fn post_registration(
    form: Form<DraftForm<'_>>,
    submitter: &State<Submitter>,
    query: &State<RecordQuery>,
    mut renderer: PageRenderer<'_>,
) -> Result<Either<Flash<Redirect>, Webpage>, Error> {
    let mut screen = EntryScreen::new();
    for (field, value) in form.values() {
        screen.edit(field, value);
    }

    let notification = screen.submit(submitter, query).await;
    match notification {
        Some(notification) if screen.submitted().is_some() => Ok(Either::Left(
            notification.flash(Redirect::to(uri!(registered))),
        )),
        notification => {
            if let Some(notification) = notification {
                renderer.notify(notification);
            }
            renderer.entry(&screen).await.map(Either::Right)
        }
    }
}

/// Shown only right after a successful submission, which leaves its flash behind.
#[get("/registrado")]
async fn registered(
    config: &State<AppConfig>,
    mut renderer: PageRenderer<'_>,
) -> Result<Either<Webpage, Redirect>, Error> {
    if !renderer.pending().contains(&entry::submitted()) {
        return Ok(Either::Right(Redirect::to(uri!(index(_)))));
    }
    renderer.success(&config.exit_url).await.map(Either::Left)
}

#[get("/export?<lote>")]
async fn export_page(
    lote: Option<&str>,
    query: &State<RecordQuery>,
    config: &State<AppConfig>,
    mut renderer: PageRenderer<'_>,
) -> Result<Webpage, Error> {
    let mut screen = ExportScreen::new();
    screen.select_batch(lote.and_then(|lote| lote.parse().ok()));
    if let Some(notification) = screen.load(query).await {
        renderer.notify(notification);
    }
    renderer.export(&screen, &config.display_offset()).await
}

#[get("/export/download?<lote>")]
async fn download(
    lote: Option<&str>,
    query: &State<RecordQuery>,
    config: &State<AppConfig>,
) -> Either<ExportFile, Flash<Redirect>> {
    let mut screen = ExportScreen::new();
    screen.select_batch(lote.and_then(|lote| lote.parse().ok()));
    let back = Redirect::to(match screen.batch() {
        Some(batch) => format!("/export?lote={batch}"),
        None => "/export".to_string(),
    });

    if let Some(notification) = screen.load(query).await {
        return Either::Right(notification.flash(back));
    }

    let offset = config.display_offset();
    let today = Utc::now().with_timezone(&offset).date_naive();
    match screen.export(&offset, today) {
        Ok(file) => Either::Left(file),
        Err(notification) => Either::Right(notification.flash(back)),
    }
}

#[catch(404)]
async fn not_found(req: &Request<'_>) -> Result<(Status, Webpage), Error> {
    let path = req.uri().path().to_string();
    match req.guard::<PageRenderer<'_>>().await {
        Outcome::Success(mut renderer) => {
            let page = renderer.not_found(&path).await?;
            Ok((Status::NotFound, page))
        }
        Outcome::Error((_, e)) => Err(e),
        Outcome::Forward(_) => Err(Error::TemplateNotFound),
    }
}

fn build(rocket: Rocket<Build>, database: DatabaseFairing) -> Rocket<Build> {
    rocket
        .attach(AdHoc::config::<AppConfig>())
        .attach(database)
        .attach(TemplateFairing::fairing())
        .mount(
            "/",
            routes![
                get_style,
                index,
                post_registration,
                registered,
                export_page,
                download,
            ],
        )
        .register("/", catchers![not_found])
}

#[launch]
fn rocket() -> _ {
    build(rocket::build(), DatabaseFairing::fairing())
}
