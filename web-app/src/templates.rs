use std::{convert::Into, env, fs, path::PathBuf};

use chrono::FixedOffset;
use include_dir::{include_dir, Dir};
use rocket::{
    fairing::{self, Fairing, Info, Kind},
    http::Status,
    request::{self, FlashMessage, FromRequest, Outcome},
    response::{
        content::{RawCss, RawHtml},
        Responder,
    },
    tokio::sync::RwLock,
    Build, Request, Rocket, State,
};
use shared::{data::Batch, validation::Field};
use tera::{Context, Tera};
use thiserror::Error;

use crate::{
    error::Error,
    screens::{
        entry::EntryScreen,
        export::{ExportScreen, TableState},
        Notification,
    },
};

static TEMPLATE_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");
static STYLE: &str = include_str!("../webroot/style.css");

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Could not read directory '{0}'. {1}")]
    FailedToReadDirectory(PathBuf, std::io::Error),
    #[error("Tera encountered an error. {0}")]
    TeraError(#[from] tera::Error),
    #[error("Failed to read file. {0}")]
    FileReadError(std::io::Error),
}

/// Loads the page templates and the stylesheet at ignition.
///
/// With `TEMPLATE_DIR` set they are read from that directory instead of the
/// binary, and `/template/refresh` reloads them.
pub struct TemplateFairing;

impl TemplateFairing {
    pub fn fairing() -> Self {
        Self {}
    }
}

#[rocket::async_trait]
impl Fairing for TemplateFairing {
    fn info(&self) -> Info {
        Info {
            name: "Template",
            kind: Kind::Ignite | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let debug_mode = if let Ok(path) = env::var("TEMPLATE_DIR") {
            if path.trim().is_empty() {
                error!("Could not load alternative templates. TEMPLATE_DIR is empty.");
                return Err(rocket);
            }
            Some(PathBuf::from(path))
        } else {
            None
        };

        let rocket = if debug_mode.is_some() {
            rocket.mount("/template", routes![refresh])
        } else {
            rocket
        };

        let templates = match Templates::new(debug_mode) {
            Ok(templates) => templates,
            Err(e) => {
                error!("Could not create page renderer. {e}");
                return Err(rocket);
            }
        };

        Ok(rocket.manage(templates))
    }
}

#[get("/refresh")]
async fn refresh(template: &State<Templates>) -> Result<(), Error> {
    template.refresh().await?;
    info!("Templates reloaded");
    Ok(())
}

pub struct Webpage(RawHtml<String>);

impl From<String> for Webpage {
    fn from(value: String) -> Self {
        Self(RawHtml(value))
    }
}

impl<'r> Responder<'r, 'static> for Webpage {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        self.0.respond_to(request)
    }
}

pub struct Templates {
    debug_mode: Option<PathBuf>,
    tera: RwLock<Tera>,
    style: RwLock<String>,
}

impl Templates {
    fn new(debug_mode: Option<PathBuf>) -> Result<Self, Error> {
        let tera = RwLock::new(load_templates(&debug_mode)?);
        let style = RwLock::new(load_styling(&debug_mode)?);

        Ok(Self {
            debug_mode,
            tera,
            style,
        })
    }

    async fn refresh(&self) -> Result<(), Error> {
        let mut tera = self.tera.write().await;
        *tera = load_templates(&self.debug_mode)?;

        let mut style = self.style.write().await;
        *style = load_styling(&self.debug_mode)?;
        Ok(())
    }
}

/// Per-request rendering context. Picks up a pending flash notification.
pub struct PageRenderer<'r> {
    templates: &'r Templates,
    context: Context,
    notifications: Vec<Notification>,
}

impl<'r> PageRenderer<'r> {
    /// Queues a notification for the page about to be rendered.
    pub fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Notifications already queued for this page, flash included.
    pub fn pending(&self) -> &[Notification] {
        &self.notifications
    }

    pub async fn style(&self) -> RawCss<String> {
        RawCss(self.templates.style.read().await.clone())
    }

    pub async fn entry(&mut self, screen: &EntryScreen) -> Result<Webpage, Error> {
        self.context.insert("batch_field", &screen.field(Field::Batch));
        self.context.insert("sections", &screen.sections());
        self.context.insert("revealed", &!screen.visible_sections().is_empty());
        self.context.insert("submitting", &screen.is_submitting());
        self.render("entry").await
    }

    pub async fn success(&mut self, exit_url: &str) -> Result<Webpage, Error> {
        self.context.insert("exit_url", exit_url);
        self.render("success").await
    }

    pub async fn export(
        &mut self,
        screen: &ExportScreen,
        offset: &FixedOffset,
    ) -> Result<Webpage, Error> {
        let (state, message) = match screen.table() {
            TableState::Idle => ("idle", None),
            TableState::Loading => ("loading", None),
            TableState::Failed(message) => ("failed", Some(message.as_str())),
            TableState::Empty => ("empty", None),
            TableState::Loaded(_) => ("loaded", None),
        };
        self.context.insert("batches", &Batch::ALL);
        self.context.insert("batch", &screen.batch());
        self.context.insert("state", state);
        self.context.insert("error_message", &message);
        self.context.insert("rows", &screen.rows(offset));
        self.context.insert("export_enabled", &screen.export_enabled());
        self.context.insert("export_notice", &screen.export_notice());
        self.render("export").await
    }

    pub async fn not_found(&mut self, path: &str) -> Result<Webpage, Error> {
        self.context.insert("path", path);
        self.render("not_found").await
    }

    async fn render(&mut self, template: &str) -> Result<Webpage, Error> {
        self.context.insert("notifications", &self.notifications);

        Ok(self
            .templates
            .tera
            .read()
            .await
            .render(template, &self.context)
            .map(Into::into)?)
    }
}

fn load_styling(debug_mode: &Option<PathBuf>) -> Result<String, Error> {
    if let Some(path) = debug_mode {
        Ok(fs::read_to_string(path.join("webroot/style.css"))
            .map_err(TemplateError::FileReadError)?)
    } else {
        Ok(STYLE.to_string())
    }
}

fn load_templates(debug_mode: &Option<PathBuf>) -> Result<Tera, Error> {
    let mut templates = Vec::new();
    if let Some(path) = debug_mode {
        let files = path
            .join("templates")
            .read_dir()
            .map_err(|e| TemplateError::FailedToReadDirectory(path.clone(), e))?
            .flatten();
        for file in files {
            if let Some(name) = file.path().file_stem() {
                let contents =
                    fs::read_to_string(file.path()).map_err(TemplateError::FileReadError)?;
                templates.push((name.to_string_lossy().to_string(), contents));
            }
        }
    } else {
        for file in TEMPLATE_DIR.files() {
            if let Some(filename) = file.path().file_stem() {
                let filename = filename.to_string_lossy();
                let template = String::from_utf8_lossy(file.contents());
                templates.push((filename.to_string(), template.to_string()));
            }
        }
    }

    let mut tera = Tera::default();
    tera.autoescape_on(vec![""]);
    tera.add_raw_templates(templates)
        .map_err(TemplateError::TeraError)?;
    Ok(tera)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageRenderer<'r> {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let notifications = req
            .guard::<Option<FlashMessage<'_>>>()
            .await
            .succeeded()
            .flatten()
            .map(|flash| Notification::from_flash(&flash))
            .into_iter()
            .collect();

        let guard = req.guard::<&State<Templates>>().await;
        let templates = match guard {
            Outcome::Success(templates) => templates,
            Outcome::Error(_) => {
                return Outcome::Error((Status::InternalServerError, Error::TemplateNotFound))
            }
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        Outcome::Success(PageRenderer {
            templates,
            context: Context::default(),
            notifications,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_templates_parse() {
        let tera = load_templates(&None).unwrap();
        let names: Vec<_> = tera.get_template_names().collect();
        for name in ["base", "entry", "success", "export", "not_found"] {
            assert!(names.contains(&name), "missing template {name}");
        }
    }

    #[test]
    fn not_found_page_names_the_path() {
        let tera = load_templates(&None).unwrap();
        let mut context = Context::default();
        context.insert("path", "nada");
        context.insert("notifications", &Vec::<Notification>::new());

        let page = tera.render("not_found", &context).unwrap();

        assert!(page.contains("Página no encontrada"));
        assert!(page.contains("<code>nada</code>"));
    }
}
