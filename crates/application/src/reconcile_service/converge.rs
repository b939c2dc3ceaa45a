use super::*;

impl ReconcileService {
    pub(super) async fn converge(
        &self,
        snapshot: &mut DeclaredSnapshot,
    ) -> AppResult<Vec<ReconcileAction>> {
        let secrets = self
            .secret_resolver
            .resolve(&snapshot.unique_remote_secret_names())
            .await?;

        let mut actions = Vec::new();
        for kind in ResourceKind::ALL {
            self.converge_kind(kind, snapshot.state_mut(kind), &secrets, &mut actions)
                .await?;
        }

        Ok(actions)
    }

    async fn converge_kind(
        &self,
        kind: ResourceKind,
        declared: &mut DeclaredState,
        secrets: &ResolvedSecrets,
        actions: &mut Vec<ReconcileAction>,
    ) -> AppResult<()> {
        let remote = self.remotes.get(kind);

        let live = remote
            .list()
            .await
            .map_err(|error| error.context(format!("failed to get live {kind}s")))?;
        debug!(%kind, declared = declared.len(), live = live.len(), "loaded state");

        self.delete_undeclared(kind, remote.as_ref(), declared, &live, actions)
            .await?;
        self.apply_declared(kind, remote.as_ref(), declared, &live, secrets, actions)
            .await?;

        let verified = remote
            .list()
            .await
            .map_err(|error| error.context(format!("failed to get new live {kind}s")))?;
        self.verify_and_record(kind, declared, &verified).await
    }

    async fn delete_undeclared(
        &self,
        kind: ResourceKind,
        remote: &dyn ResourceRemote,
        declared: &DeclaredState,
        live: &LiveState,
        actions: &mut Vec<ReconcileAction>,
    ) -> AppResult<()> {
        for resource in live.resources() {
            let name = resource.name();
            if declared.get(name).is_some() {
                continue;
            }

            if !resource.managed() {
                debug!(%kind, name, "skipping delete of unmanaged resource");
                continue;
            }

            remote
                .delete(name)
                .await
                .map_err(|error| error.context(format!("failed to delete {name}")))?;
            info!(%kind, name, "deleted resource");
            actions.push(ReconcileAction {
                kind,
                name: name.to_owned(),
                action_type: ReconcileActionType::Delete,
                reason: None,
            });
        }

        Ok(())
    }

    async fn apply_declared(
        &self,
        kind: ResourceKind,
        remote: &dyn ResourceRemote,
        declared: &mut DeclaredState,
        live: &LiveState,
        secrets: &ResolvedSecrets,
        actions: &mut Vec<ReconcileAction>,
    ) -> AppResult<()> {
        for name in declared.sorted_names() {
            let name = name.as_str();
            let Some(specification) = declared.get(name) else {
                continue;
            };
            if !specification.should_run_in_location(self.config.location.as_str()) {
                info!(
                    %kind,
                    name,
                    location = %self.config.location,
                    "skipping resource filtered out by location"
                );
                continue;
            }

            self.secret_resolver
                .inject_secrets(declared, name, secrets)?;
            if let Some(registry) = &self.config.registry {
                self.secret_resolver
                    .inject_registry(declared, name, registry)?;
            }

            let specification = declared.get(name).ok_or_else(|| {
                AppError::Internal(format!("declared entry \"{name}\" disappeared"))
            })?;
            let live_resource = live.get(name);

            let (needs_update, reason) = self
                .fingerprints
                .needs_update(kind, name, live_resource, specification)
                .await?;
            if !needs_update {
                info!(%kind, name, %reason, "skipping resource");
                continue;
            }

            let action_type = match live_resource {
                Some(resource) => {
                    if !resource.managed() {
                        return Err(AppError::Conflict(format!(
                            "trying to update a non-managed {kind}: {name}"
                        )));
                    }

                    remote
                        .update(name, specification)
                        .await
                        .map_err(|error| error.context(format!("failed to update {name}")))?;
                    ReconcileActionType::Update
                }
                None => {
                    remote
                        .create(name, specification)
                        .await
                        .map_err(|error| error.context(format!("failed to create {name}")))?;
                    ReconcileActionType::Create
                }
            };

            info!(%kind, name, %reason, action = %action_type, "applied resource");
            actions.push(ReconcileAction {
                kind,
                name: name.to_owned(),
                action_type,
                reason: Some(reason),
            });
        }

        Ok(())
    }

    async fn verify_and_record(
        &self,
        kind: ResourceKind,
        declared: &DeclaredState,
        verified: &LiveState,
    ) -> AppResult<()> {
        let location = self.config.location.as_str();
        let applied: Vec<_> = declared
            .specifications()
            .filter(|specification| specification.should_run_in_location(location))
            .collect();

        for specification in &applied {
            if verified.get(specification.name()).is_none() {
                return Err(AppError::Consistency(format!(
                    "unable to locate {} after create or update",
                    specification.name()
                )));
            }
        }

        for specification in applied {
            let name = specification.name();
            self.fingerprints
                .set(kind, name, verified.get(name), specification)
                .await?;
        }

        Ok(())
    }
}
