use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{models, routes, services};

#[derive(OpenApi)]
#[openapi(
	info(title = "remit-access", description = "Staff accounts, roles and permissions for the remittance back-office"),
	paths(
		routes::auth::login,
		routes::auth::register,
		routes::auth::me,
		routes::auth::logout,
		routes::auth::change_password,
		routes::auth::forgot_password,
		routes::auth::reset_password,
		routes::permissions::list_permissions,
		routes::permissions::create_permission,
		routes::permissions::get_permission,
		routes::permissions::update_permission,
		routes::permissions::delete_permission,
		routes::roles::list_roles,
		routes::roles::list_available_roles,
		routes::roles::create_role,
		routes::roles::get_role,
		routes::roles::update_role,
		routes::roles::delete_role,
		routes::staff::list_staff,
		routes::staff::get_staff,
		routes::staff::update_staff,
		routes::staff::delete_staff,
		routes::staff::assign_role,
		routes::staff::assign_permissions,
		routes::seed::run_seed,
		routes::health::health
	),
	components(
		schemas(
			models::permission::Permission,
			models::permission::PermissionRef,
			models::permission::PermissionModule,
			models::permission::PermissionAction,
			models::permission::PermissionCreateRequest,
			models::permission::PermissionUpdateRequest,
			models::role::Role,
			models::role::AvailableRole,
			models::role::RoleCreateRequest,
			models::role::RoleUpdateRequest,
			models::staff::Staff,
			models::staff::RoleLabel,
			models::staff::StaffSummary,
			models::staff::RegisterStaffRequest,
			models::staff::LoginRequest,
			models::staff::AuthResponse,
			models::staff::AssignRoleRequest,
			models::staff::StaffUpdateRequest,
			models::staff::ChangePasswordRequest,
			models::staff::ForgotPasswordRequest,
			models::staff::ResetPasswordRequest,
			models::staff::AssignPermissionsRequest,
			models::staff::Pagination,
			models::staff::RoleCount,
			models::staff::StaffPage,
			services::seed::SeedOutcome,
			routes::MessageResponse,
			routes::health::HealthResponse
		)
	),
	tags(
		(name = "Auth", description = "Login, session and self-service endpoints"),
		(name = "RBAC", description = "Permission registry and role catalog"),
		(name = "Staff", description = "Staff accounts and role assignment"),
		(name = "Health", description = "Liveness")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	normalize_path_operations(&mut doc);
	ensure_security_components(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn normalize_path_operations(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		let snapshot = paths.clone();
		for (path, item) in snapshot {
			if let Some(ops) = item.as_object() {
				let mut normalized = Map::new();
				for (method, val) in ops {
					let key = method.to_lowercase();
					if let Some(existing) = normalized.get_mut(&key) {
						merge_values(existing, val);
					} else {
						normalized.insert(key, val.clone());
					}
				}
				paths.insert(path, Value::Object(normalized));
			}
		}
	}
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else {
		return;
	};

	let components = root.entry("components").or_insert_with(|| Value::Object(Map::new()));
	let Some(components) = components.as_object_mut() else {
		return;
	};

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));
	if let Some(schemes) = schemes.as_object_mut() {
		schemes.insert(
			"bearerAuth".to_string(),
			json!({
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT"
			}),
		);
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{port}");

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

fn merge_values(target: &mut Value, addition: &Value) {
	match (target, addition) {
		(Value::Object(dest), Value::Object(src)) => {
			for (key, value) in src {
				if let Some(existing) = dest.get_mut(key) {
					merge_values(existing, value);
				} else {
					dest.insert(key.clone(), value.clone());
				}
			}
		}
		(Value::Array(dest), Value::Array(src)) => {
			for item in src {
				if !dest.contains(item) {
					dest.push(item.clone());
				}
			}
		}
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_rbac_paths_and_bearer_scheme() {
		let doc = serde_json::to_value(build_openapi(8000).unwrap()).unwrap();
		assert!(doc["paths"]["/rbac/roles/{id}"]["delete"].is_object());
		assert!(doc["paths"]["/auth/login"]["post"].is_object());
		assert_eq!(doc["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
		assert_eq!(doc["servers"][0]["url"], "http://localhost:8000");
	}
}
