//! The base models wired together: tables, stores, seed data and the model
//! methods clients can call.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Value, json};
use tracing::info;

use basis_auth::group::{GROUP_NO_ONE, GROUP_PORTAL, GROUP_SYSTEM, GROUP_USER};
use basis_auth::{
    AccessKind, AccessRule, CredentialStore, Group, GroupDefinition, GroupRef, GroupTable, LoginLog,
    PasswordAuthBackend, ReloadSummary, SUPERUSER_ID, SecurityRegistry, User, UserDirectory,
    reload_groups,
};
use basis_core::{DomainError, DomainResult, Model, RecordId};
use basis_currency::{Currency, CurrencyRate, SymbolPosition, compute, rate_at};
use basis_parties::{
    Bank, BankAccount, Company, Partner, PartnerCategory, PartnerGraph, PartnerType, full_name,
};
use basis_sequence::{Sequence, SequenceStore, SequenceUpdate};

use crate::actions::{self, WindowAction};
use crate::attachments::AttachmentStore;
use crate::filters::{self, Filter};
use crate::methods::{MethodError, MethodRegistry, Params, name_pairs, to_json};
use crate::table::{SearchOptions, Table, project, select_rows};
use crate::translations::{self, Translation};

/// Administrator created by the seed data.
pub const ADMIN_ID: RecordId = RecordId::new(2);

/// Values used when loading the base data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOptions {
    pub admin_password: String,
    pub company_name: String,
    /// ISO code of the main company's currency.
    pub currency: String,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            admin_password: "admin".to_string(),
            company_name: "My Company".to_string(),
            currency: "EUR".to_string(),
        }
    }
}

/// Login lookup over the user table.
#[derive(Debug, Clone)]
pub struct TableUsers(pub Arc<Table<User>>);

impl UserDirectory for TableUsers {
    fn find_by_login(&self, login: &str) -> Option<User> {
        self.0.find(|u| u.login == login)
    }
}

/// Every base table and store, shared by the web layer and background jobs.
#[derive(Debug, Default)]
pub struct BaseModels {
    pub partners: Arc<Table<Partner>>,
    pub categories: Arc<Table<PartnerCategory>>,
    pub banks: Arc<Table<Bank>>,
    pub bank_accounts: Arc<Table<BankAccount>>,
    pub companies: Arc<Table<Company>>,
    pub currencies: Arc<Table<Currency>>,
    pub rates: Arc<Table<CurrencyRate>>,
    pub users: Arc<Table<User>>,
    pub filters: Arc<Table<Filter>>,
    pub translations: Arc<Table<Translation>>,
    pub actions: Arc<Table<WindowAction>>,
    pub attachments: Arc<AttachmentStore>,
    pub sequences: Arc<SequenceStore>,
    pub groups: Arc<GroupTable>,
    pub security: Arc<SecurityRegistry>,
    pub credentials: Arc<CredentialStore>,
    pub logins: Arc<LoginLog>,
}

impl BaseModels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load groups, access rules, currencies, the main company, the system
    /// and admin users and the default actions. Only valid on empty tables.
    pub fn seed(&self, options: &SeedOptions) -> DomainResult<()> {
        if !self.users.is_empty() {
            return Err(DomainError::conflict("base data is already loaded"));
        }
        for group in default_groups() {
            self.security.define_group(group);
        }
        for rule in default_rules() {
            self.security.add_rule(rule);
        }

        self.currencies.create(Currency::new("EUR", "€"))?;
        self.currencies
            .create(Currency::new("USD", "$").with_position(SymbolPosition::Before))?;
        let code = options.currency.trim().to_ascii_uppercase();
        let currency = match self.currencies.find(|c| c.name == code) {
            Some(currency) => currency,
            None => self.currencies.create(Currency::new(code.clone(), code))?,
        };

        let company =
            self.create_company_record(Company::new(&options.company_name).with_currency(currency.id))?;

        let mut system = User::new("__system__", "System")
            .with_company(company.id)
            .with_groups([GROUP_SYSTEM]);
        system.active = false;
        let system = self.create_user_record(system, None)?;
        let admin = User::new("admin", "Administrator")
            .with_company(company.id)
            .with_groups([GROUP_SYSTEM, GROUP_NO_ONE]);
        let admin = self.create_user_record(admin, Some(&options.admin_password))?;
        if system.id != SUPERUSER_ID || admin.id != ADMIN_ID {
            return Err(DomainError::invariant("seed users did not get the reserved ids"));
        }

        for action in default_actions() {
            self.actions.create(action)?;
        }
        let summary = self.sync_groups();
        info!(
            company = %company.name,
            currency = %currency.name,
            groups = summary.created,
            "base data loaded"
        );
        Ok(())
    }

    /// Mirror the registry groups into the group table and rebuild
    /// memberships from the users' group lists.
    pub fn sync_groups(&self) -> ReloadSummary {
        reload_groups(
            &self.security,
            &self.groups,
            self.users.all().into_iter().map(|u| (u.id, u.groups)),
        )
    }

    /// Default password login over the user table.
    pub fn auth_backend(&self) -> PasswordAuthBackend<TableUsers> {
        PasswordAuthBackend::new(
            TableUsers(self.users.clone()),
            self.credentials.clone(),
            self.logins.clone(),
        )
    }

    pub fn partner_graph(&self) -> PartnerGraph {
        PartnerGraph::new(self.partners.all())
    }

    fn check_groups(&self, groups: &[GroupRef]) -> DomainResult<()> {
        let known = self.security.groups();
        match groups.iter().find(|g| !known.iter().any(|d| &d.group == *g)) {
            Some(unknown) => Err(DomainError::validation(format!("unknown group '{unknown}'"))),
            None => Ok(()),
        }
    }

    fn sync_memberships(&self, user: &User) -> DomainResult<()> {
        self.security
            .set_memberships(user.id, user.groups.iter().cloned())
            .map_err(|e| DomainError::validation(e.to_string()))
    }

    /// Create a user, its partner when none is given, its password and its
    /// group memberships.
    pub fn create_user_record(&self, user: User, password: Option<&str>) -> DomainResult<User> {
        self.check_groups(&user.groups)?;
        if let Some(partner) = user.partner_id {
            self.partners.get(partner)?;
        }
        if password.is_some_and(str::is_empty) {
            return Err(DomainError::validation("the password cannot be empty"));
        }
        let mut user = self.users.create(user)?;
        if user.partner_id.is_none() {
            let mut partner = Partner::new(user.display_name());
            partner.company_id = user.company_id;
            partner.lang = Some(user.lang.clone());
            let partner = self.partners.create(partner)?;
            user = self.users.update(user.id, |u| u.partner_id = Some(partner.id))?;
        }
        if let Some(password) = password {
            self.credentials.set_password(user.id, password);
        }
        self.sync_memberships(&user)?;
        info!(uid = %user.id, login = %user.login, "user created");
        Ok(user)
    }

    pub fn create_user(&self, mut values: Map<String, Value>) -> DomainResult<User> {
        let password = take_password(&mut values)?;
        values.remove("id");
        let user: User = serde_json::from_value(Value::Object(values))
            .map_err(|e| DomainError::validation(format!("User: {e}")))?;
        self.create_user_record(user, password.as_deref())
    }

    pub fn write_user(&self, id: RecordId, values: &Map<String, Value>) -> DomainResult<User> {
        let mut values = values.clone();
        let password = take_password(&mut values)?;
        if let Some(groups) = values.get("groups") {
            let groups: Vec<GroupRef> = serde_json::from_value(groups.clone())
                .map_err(|e| DomainError::validation(format!("groups: {e}")))?;
            self.check_groups(&groups)?;
        }
        let user = if values.is_empty() {
            self.users.get(id)?
        } else {
            self.users.write_values(id, &values)?
        };
        if let Some(password) = password {
            self.credentials.set_password(user.id, &password);
        }
        self.sync_memberships(&user)?;
        Ok(user)
    }

    pub fn unlink_user(&self, id: RecordId) -> DomainResult<()> {
        if id == SUPERUSER_ID {
            return Err(DomainError::validation(
                "the system user is used internally and cannot be removed",
            ));
        }
        self.users.unlink(id)?;
        self.credentials.remove(id);
        self.security
            .set_memberships(id, std::iter::empty())
            .map_err(|e| DomainError::validation(e.to_string()))?;
        info!(uid = %id, "user removed");
        Ok(())
    }

    pub fn change_password(&self, uid: RecordId, old: &str, new: &str) -> DomainResult<()> {
        if !self.credentials.verify(uid, old) {
            return Err(DomainError::InvalidCredentials);
        }
        if new.is_empty() {
            return Err(DomainError::validation("the new password cannot be empty"));
        }
        self.credentials.set_password(uid, new);
        info!(%uid, "password changed");
        Ok(())
    }

    /// Create a company together with the partner carrying its address.
    pub fn create_company_record(&self, mut company: Company) -> DomainResult<Company> {
        let created_partner = match company.partner_id {
            Some(partner) => {
                self.partners.get(partner)?;
                None
            }
            None => {
                let partner = self.partners.create(company.partner_template())?;
                company.partner_id = Some(partner.id);
                Some(partner.id)
            }
        };
        match self.companies.create(company) {
            Ok(company) => {
                if let Some(partner) = created_partner {
                    self.partners
                        .update(partner, |p| p.company_id = Some(company.id))?;
                }
                Ok(company)
            }
            Err(err) => {
                if let Some(partner) = created_partner {
                    let _ = self.partners.unlink(partner);
                }
                Err(err)
            }
        }
    }

    pub fn create_company(&self, mut values: Map<String, Value>) -> DomainResult<Company> {
        values.remove("id");
        let company: Company = serde_json::from_value(Value::Object(values))
            .map_err(|e| DomainError::validation(format!("Company: {e}")))?;
        self.create_company_record(company)
    }

    /// Convert `amount` between two currencies at `date`.
    pub fn convert(
        &self,
        amount: f64,
        from: RecordId,
        to: RecordId,
        date: NaiveDate,
        company: Option<RecordId>,
        round: bool,
    ) -> DomainResult<f64> {
        let from = self.currencies.get(from)?;
        let to = self.currencies.get(to)?;
        Ok(compute(amount, &from, &to, &self.rates.all(), date, company, round))
    }

    /// Register every base model method on `registry`.
    pub fn register(self: &Arc<Self>, registry: &mut MethodRegistry) {
        self.register_partners(registry);
        self.register_companies(registry);
        self.register_users(registry);
        self.register_groups(registry);
        self.register_sequences(registry);
        self.register_currencies(registry);
        registry.register_table(self.banks.clone());
        registry.register_table(self.bank_accounts.clone());
        self.attachments.register(registry);
        filters::register(self.filters.clone(), registry);
        translations::register(self.translations.clone(), registry);
        actions::register(self.actions.clone(), registry);
    }

    fn register_partners(self: &Arc<Self>, registry: &mut MethodRegistry) {
        registry.register_table(self.partners.clone());
        registry.register_table(self.categories.clone());

        let m = self.clone();
        registry.register(Partner::NAME, "name_get", AccessKind::Read, move |_ctx, params| {
            let ids = Params::from_value(params).ids(0, "ids")?;
            let graph = m.partner_graph();
            let mut pairs = Vec::with_capacity(ids.len());
            for id in ids.into_iter().filter(|id| graph.get(*id).is_ok()) {
                pairs.push((id, graph.display_name(id)?));
            }
            Ok(name_pairs(pairs))
        });

        let m = self.clone();
        registry.register(Partner::NAME, "address_get", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let ids = params.ids(0, "ids")?;
            let names: Vec<String> = params
                .optional(1, "adr_pref")?
                .unwrap_or_else(|| vec![PartnerType::Contact.as_str().to_string()]);
            let types = names
                .iter()
                .map(|n| {
                    PartnerType::parse(n)
                        .ok_or_else(|| MethodError::invalid(format!("unknown address type '{n}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let Some(first) = ids.first() else {
                return Ok(json!({}));
            };
            let found = m.partner_graph().address_get(*first, &types)?;
            Ok(Value::Object(
                found
                    .into_iter()
                    .map(|(kind, id)| (kind.as_str().to_string(), json!(id)))
                    .collect(),
            ))
        });

        let m = self.clone();
        registry.register(Partner::NAME, "commercial_partner", AccessKind::Read, move |_ctx, params| {
            let ids = Params::from_value(params).ids(0, "ids")?;
            let graph = m.partner_graph();
            let commercial = ids
                .into_iter()
                .map(|id| graph.commercial_partner(id))
                .collect::<DomainResult<Vec<_>>>()?;
            Ok(json!(commercial))
        });

        let m = self.clone();
        registry.register(Partner::NAME, "email_formatted", AccessKind::Read, move |_ctx, params| {
            let ids = Params::from_value(params).ids(0, "ids")?;
            let emails: Vec<String> = m.partners.browse(&ids).iter().map(Partner::email_formatted).collect();
            Ok(json!(emails))
        });

        let m = self.clone();
        registry.register(PartnerCategory::NAME, "name_get", AccessKind::Read, move |_ctx, params| {
            let ids = Params::from_value(params).ids(0, "ids")?;
            let categories = m.categories.all();
            let mut pairs = Vec::with_capacity(ids.len());
            for id in ids.into_iter().filter(|id| categories.iter().any(|c| c.id == *id)) {
                pairs.push((id, full_name(&categories, id)?));
            }
            Ok(name_pairs(pairs))
        });
    }

    fn register_companies(self: &Arc<Self>, registry: &mut MethodRegistry) {
        registry.register_table(self.companies.clone());

        let m = self.clone();
        registry.register(Company::NAME, "create", AccessKind::Create, move |_ctx, params| {
            let values: Map<String, Value> = Params::from_value(params).required(0, "vals")?;
            Ok(json!(m.create_company(values)?.id))
        });
    }

    fn register_users(self: &Arc<Self>, registry: &mut MethodRegistry) {
        registry.register_table(self.users.clone());

        let m = self.clone();
        registry.register(User::NAME, "create", AccessKind::Create, move |_ctx, params| {
            let values: Map<String, Value> = Params::from_value(params).required(0, "vals")?;
            Ok(json!(m.create_user(values)?.id))
        });

        let m = self.clone();
        registry.register(User::NAME, "write", AccessKind::Write, move |_ctx, params| {
            let params = Params::from_value(params);
            let values: Map<String, Value> = params.required(1, "vals")?;
            for id in params.ids(0, "ids")? {
                m.write_user(id, &values)?;
            }
            Ok(json!(true))
        });

        let m = self.clone();
        registry.register(User::NAME, "unlink", AccessKind::Unlink, move |_ctx, params| {
            for id in Params::from_value(params).ids(0, "ids")? {
                m.unlink_user(id)?;
            }
            Ok(json!(true))
        });

        let m = self.clone();
        registry.register(User::NAME, "change_password", AccessKind::Read, move |ctx, params| {
            let params = Params::from_value(params);
            let old: String = params.required(0, "old_passwd")?;
            let new: String = params.required(1, "new_passwd")?;
            m.change_password(ctx.uid, &old, &new)?;
            Ok(json!(true))
        });

        let m = self.clone();
        registry.register(User::NAME, "has_group", AccessKind::Read, move |ctx, params| {
            let group: String = Params::from_value(params).required(0, "group_ext_id")?;
            Ok(json!(m.security.has_group(ctx.uid, &GroupRef::from(group.as_str()))))
        });

        let m = self.clone();
        registry.register(User::NAME, "context_get", AccessKind::Read, move |ctx, _params| {
            Ok(Value::Object(m.users.get(ctx.uid)?.context()))
        });
    }

    fn group_rows(&self) -> Result<Vec<Map<String, Value>>, MethodError> {
        self.groups
            .list()
            .iter()
            .map(|group| match to_json(group)? {
                Value::Object(mut row) => {
                    row.insert("display_name".to_string(), json!(group.display_name()));
                    Ok(row)
                }
                _ => Err(DomainError::invariant("group is not an object").into()),
            })
            .collect()
    }

    fn register_groups(self: &Arc<Self>, registry: &mut MethodRegistry) {
        let m = self.clone();
        registry.register(Group::NAME, "search_read", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let domain = params.domain(0, "domain")?;
            let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
            let options = params.search_options(2)?;
            let rows = select_rows(m.group_rows()?, &domain, &options)?;
            Ok(json!(rows.into_iter().map(|r| project(r, &fields)).collect::<Vec<_>>()))
        });

        let m = self.clone();
        registry.register(Group::NAME, "search_count", AccessKind::Read, move |_ctx, params| {
            let domain = Params::from_value(params).domain(0, "domain")?;
            let rows = select_rows(m.group_rows()?, &domain, &SearchOptions::default())?;
            Ok(json!(rows.len()))
        });

        let m = self.clone();
        registry.register(Group::NAME, "read", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let ids = params.ids(0, "ids")?;
            let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
            let rows: Vec<_> = m
                .group_rows()?
                .into_iter()
                .filter(|r| {
                    r.get("id")
                        .and_then(Value::as_i64)
                        .is_some_and(|id| ids.contains(&RecordId::new(id)))
                })
                .map(|r| project(r, &fields))
                .collect();
            Ok(json!(rows))
        });

        let m = self.clone();
        registry.register(Group::NAME, "name_get", AccessKind::Read, move |_ctx, params| {
            let ids = Params::from_value(params).ids(0, "ids")?;
            let pairs = ids
                .into_iter()
                .filter_map(|id| m.groups.get(id).map(|g| (id, g.name)))
                .collect();
            Ok(name_pairs(pairs))
        });

        let m = self.clone();
        registry.register(Group::NAME, "create", AccessKind::Create, move |_ctx, params| {
            let values: Map<String, Value> = Params::from_value(params).required(0, "vals")?;
            let name = values.get("name").and_then(Value::as_str).unwrap_or_default();
            let group = Group {
                id: RecordId::default(),
                group_id: GroupRef::from(name),
                name: name.to_string(),
            };
            Ok(json!(m.groups.create(group)?.id))
        });

        let m = self.clone();
        registry.register(Group::NAME, "write", AccessKind::Write, move |_ctx, params| {
            for id in Params::from_value(params).ids(0, "ids")? {
                let current = m
                    .groups
                    .get(id)
                    .ok_or_else(|| DomainError::not_found(format!("group {id}")))?;
                m.groups.write(id, current)?;
            }
            Ok(json!(true))
        });

        let m = self.clone();
        registry.register(Group::NAME, "unlink", AccessKind::Unlink, move |_ctx, params| {
            for id in Params::from_value(params).ids(0, "ids")? {
                m.groups.unlink(id)?;
            }
            Ok(json!(true))
        });

        let m = self.clone();
        registry.register(Group::NAME, "reload", AccessKind::Write, move |_ctx, _params| {
            to_json(&m.sync_groups())
        });
    }

    fn sequence_rows(&self) -> Result<Vec<Map<String, Value>>, MethodError> {
        self.sequences.list().iter().map(sequence_row).collect()
    }

    fn register_sequences(self: &Arc<Self>, registry: &mut MethodRegistry) {
        let m = self.clone();
        registry.register(Sequence::NAME, "create", AccessKind::Create, move |_ctx, params| {
            let mut values: Map<String, Value> = Params::from_value(params).required(0, "vals")?;
            values.remove("id");
            let sequence: Sequence = serde_json::from_value(Value::Object(values))
                .map_err(|e| DomainError::validation(format!("Sequence: {e}")))?;
            Ok(json!(m.sequences.create(sequence)?.id))
        });

        let m = self.clone();
        registry.register(Sequence::NAME, "write", AccessKind::Write, move |_ctx, params| {
            let params = Params::from_value(params);
            let update: SequenceUpdate = params.required(1, "vals")?;
            for id in params.ids(0, "ids")? {
                m.sequences.update(id, &update)?;
            }
            Ok(json!(true))
        });

        let m = self.clone();
        registry.register(Sequence::NAME, "unlink", AccessKind::Unlink, move |_ctx, params| {
            for id in Params::from_value(params).ids(0, "ids")? {
                m.sequences.delete(id)?;
            }
            Ok(json!(true))
        });

        let m = self.clone();
        registry.register(Sequence::NAME, "read", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
            let mut rows = Vec::new();
            for id in params.ids(0, "ids")? {
                rows.push(project(sequence_row(&m.sequences.get(id)?)?, &fields));
            }
            Ok(json!(rows))
        });

        let m = self.clone();
        registry.register(Sequence::NAME, "search_read", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let domain = params.domain(0, "domain")?;
            let fields: Vec<String> = params.optional(1, "fields")?.unwrap_or_default();
            let options = params.search_options(2)?;
            let rows = select_rows(m.sequence_rows()?, &domain, &options)?;
            Ok(json!(rows.into_iter().map(|r| project(r, &fields)).collect::<Vec<_>>()))
        });

        let m = self.clone();
        registry.register(Sequence::NAME, "search_count", AccessKind::Read, move |_ctx, params| {
            let domain = Params::from_value(params).domain(0, "domain")?;
            let rows = select_rows(m.sequence_rows()?, &domain, &SearchOptions::default())?;
            Ok(json!(rows.len()))
        });

        let m = self.clone();
        registry.register(Sequence::NAME, "name_get", AccessKind::Read, move |_ctx, params| {
            let ids = Params::from_value(params).ids(0, "ids")?;
            let pairs = ids
                .into_iter()
                .filter_map(|id| m.sequences.get(id).ok().map(|s| (id, s.name)))
                .collect();
            Ok(name_pairs(pairs))
        });

        let m = self.clone();
        registry.register(Sequence::NAME, "next_by_code", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let code: String = params.required(0, "sequence_code")?;
            let at = draw_moment(&params, 1)?;
            Ok(json!(m.sequences.next_by_code(&code, at)?))
        });

        let m = self.clone();
        registry.register(Sequence::NAME, "next_by_id", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let id = first_id(&params)?;
            let at = draw_moment(&params, 1)?;
            Ok(json!(m.sequences.next_by_id(id, at)?))
        });
    }

    fn register_currencies(self: &Arc<Self>, registry: &mut MethodRegistry) {
        registry.register_table(self.currencies.clone());
        registry.register_table(self.rates.clone());

        let m = self.clone();
        registry.register(Currency::NAME, "round", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let amount: f64 = params.required(1, "amount")?;
            Ok(json!(m.currencies.get(first_id(&params)?)?.round(amount)))
        });

        let m = self.clone();
        registry.register(Currency::NAME, "is_zero", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let amount: f64 = params.required(1, "amount")?;
            Ok(json!(m.currencies.get(first_id(&params)?)?.is_zero(amount)))
        });

        let m = self.clone();
        registry.register(Currency::NAME, "compare_amounts", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let a: f64 = params.required(1, "amount1")?;
            let b: f64 = params.required(2, "amount2")?;
            let ordering = m.currencies.get(first_id(&params)?)?.compare_amounts(a, b);
            Ok(json!(ordering as i8))
        });

        let m = self.clone();
        registry.register(Currency::NAME, "format_amount", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let amount: f64 = params.required(1, "amount")?;
            Ok(json!(m.currencies.get(first_id(&params)?)?.format_amount(amount)))
        });

        let m = self.clone();
        registry.register(Currency::NAME, "compute", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let from = first_id(&params)?;
            let amount: f64 = params.required(1, "from_amount")?;
            let to: RecordId = params.required(2, "to_currency")?;
            let date: Option<NaiveDate> = params.optional(3, "date")?;
            let round: bool = params.optional(4, "round")?.unwrap_or(true);
            let company: Option<RecordId> = params.optional(5, "company_id")?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            Ok(json!(m.convert(amount, from, to, date, company, round)?))
        });

        let m = self.clone();
        registry.register(Currency::NAME, "get_rate", AccessKind::Read, move |_ctx, params| {
            let params = Params::from_value(params);
            let currency = first_id(&params)?;
            m.currencies.get(currency)?;
            let date: Option<NaiveDate> = params.optional(1, "date")?;
            let company: Option<RecordId> = params.optional(2, "company_id")?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            Ok(json!(rate_at(&m.rates.all(), currency, date, company)))
        });
    }
}

fn sequence_row(sequence: &Sequence) -> Result<Map<String, Value>, MethodError> {
    match to_json(sequence)? {
        Value::Object(mut row) => {
            row.insert("display_name".to_string(), json!(sequence.name));
            Ok(row)
        }
        _ => Err(DomainError::invariant("sequence is not an object").into()),
    }
}

fn first_id(params: &Params) -> Result<RecordId, MethodError> {
    params
        .ids(0, "ids")?
        .first()
        .copied()
        .ok_or_else(|| MethodError::invalid("no record given"))
}

/// `sequence_date` keyword (midnight of that day), else now.
fn draw_moment(params: &Params, index: usize) -> Result<NaiveDateTime, MethodError> {
    let date: Option<NaiveDate> = params.optional(index, "sequence_date")?;
    Ok(match date {
        Some(date) => date.and_time(NaiveTime::MIN),
        None => Utc::now().naive_utc(),
    })
}

/// Remove the clear-text password from client values.
fn take_password(values: &mut Map<String, Value>) -> DomainResult<Option<String>> {
    match values.remove("password") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(p)) if p.is_empty() => Ok(None),
        Some(Value::String(p)) => Ok(Some(p)),
        Some(_) => Err(DomainError::validation("password must be a string")),
    }
}

fn default_groups() -> Vec<GroupDefinition> {
    vec![
        GroupDefinition::new(GROUP_USER, "Internal User"),
        GroupDefinition::new(GROUP_SYSTEM, "Settings").implying(GROUP_USER),
        GroupDefinition::new(GROUP_PORTAL, "Portal"),
        GroupDefinition::new(GROUP_NO_ONE, "Technical Features"),
    ]
}

fn default_rules() -> Vec<AccessRule> {
    let (user_group, system_group, technical_group) = (GROUP_USER, GROUP_SYSTEM, GROUP_NO_ONE);
    let user = Some(user_group.as_str());
    let system = Some(system_group.as_str());
    let technical = Some(technical_group.as_str());
    let mut rules = Vec::new();
    for model in ["Partner", "PartnerCategory", "BankAccount", "Attachment", "Filter"] {
        rules.push(AccessRule::full(model, user));
    }
    for model in [
        "Bank",
        "Company",
        "Currency",
        "CurrencyRate",
        "User",
        "Sequence",
        "Action",
        "Translation",
    ] {
        rules.push(AccessRule::new(model, user).allow(AccessKind::Read));
        rules.push(AccessRule::full(model, system));
    }
    rules.push(AccessRule::new("Group", user).allow(AccessKind::Read));
    rules.push(AccessRule::new("Translation", None).allow(AccessKind::Read));
    rules.push(AccessRule::new("Currency", Some(GROUP_PORTAL.as_str())).allow(AccessKind::Read));
    for model in ["JobHistory", "Worker"] {
        rules.push(AccessRule::new(model, system).allow(AccessKind::Read));
        rules.push(AccessRule::full(model, technical));
    }
    rules
}

fn default_actions() -> Vec<WindowAction> {
    [
        ("base.action_partner_form", "Contacts", "Partner"),
        ("base.action_partner_category_form", "Contact Tags", "PartnerCategory"),
        ("base.action_res_company_form", "Companies", "Company"),
        ("base.action_res_users", "Users", "User"),
        ("base.action_res_groups", "Groups", "Group"),
        ("base.action_currency_form", "Currencies", "Currency"),
        ("base.action_res_bank_form", "Banks", "Bank"),
        ("base.ir_sequence_form", "Sequences", "Sequence"),
        ("base.action_attachment", "Attachments", "Attachment"),
        ("base.action_ui_view_filters", "User-defined Filters", "Filter"),
        ("base.action_translation", "Translated Terms", "Translation"),
        ("base.action_job_history", "Job History", "JobHistory"),
    ]
    .into_iter()
    .map(|(xml_id, name, model)| WindowAction::new(name, model).with_xml_id(xml_id))
    .collect()
}
