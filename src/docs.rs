use crate::api::records::{CloseDayRequest, RecordListResponse, RecordQuery, RecordResponse};
use crate::api::scan::ScanRequest;
use crate::api::users::{RegisterUser, UpdateUser, UserQuery};
use crate::model::record::{AttendanceAction, ScanResult};
use crate::model::user::User;
use crate::models::{LoginRequest, LoginResponse};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{openapi, Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "DTR System API",
        version = "1.0.0",
        description = r#"
## RFID Daily Time Record (DTR) System

This API powers an RFID-based daily time record tracker: a kiosk page
scans cards and records Time In/Out for the AM and PM sessions; an admin
dashboard manages users and records.

### 🔹 Key Features
- **Scanner**
  - Card scan with explicit Time In AM / Time Out AM / Time In PM / Time Out PM actions
- **User Management**
  - Register, update, list, and delete card holders
- **Record Management**
  - Daily records per user, close-day flagging, whole-day deletion, full reset
- **Export**
  - Monthly CSV export for payroll

### 🔐 Security
The `/scan` endpoint is public — the card is the credential. Everything
under `/api` requires the admin's **JWT Bearer token** from `/auth/login`.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::login,

        crate::api::scan::scan,

        crate::api::users::register_user,
        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::update_user,
        crate::api::users::delete_user,

        crate::api::records::list_records,
        crate::api::records::delete_record,
        crate::api::records::clear_records,
        crate::api::records::close_day,
        crate::api::export::export_csv,
    ),
    components(
        schemas(
            LoginRequest,
            LoginResponse,
            ScanRequest,
            ScanResult,
            AttendanceAction,
            User,
            RegisterUser,
            UpdateUser,
            UserQuery,
            RecordResponse,
            RecordListResponse,
            RecordQuery,
            CloseDayRequest,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Admin login"),
        (name = "Scanner", description = "Kiosk scan endpoint"),
        (name = "Users", description = "Card holder management APIs"),
        (name = "Records", description = "Time record management and export APIs"),
    )
)]
pub struct ApiDoc;

pub struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
