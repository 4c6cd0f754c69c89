use onestop_forms::{FieldDefinition, FormError, FormTemplate, InMemoryTemplateStore, StepDefinition, StepRole,
                    TemplateFilter, TemplateStore};

fn template(name: &str, roles: &[StepRole]) -> FormTemplate {
  let process = roles.iter().enumerate().map(|(i, r)| StepDefinition::new(i as u32, *r)).collect();
  FormTemplate::new(name, None, vec![FieldDefinition::text("reason", "Lý do", true)], process).expect("template")
}

#[test]
fn create_get_update_delete() {
  let store = InMemoryTemplateStore::new();
  let t = template("Giấy xác nhận sinh viên", &[StepRole::Coordinator]);
  let id = store.create_template(t.clone()).expect("create");
  assert_eq!(store.get_template(&id).expect("get").name, t.name);

  let mut edited = t.clone();
  edited.name = "Giấy xác nhận (mới)".into();
  edited.process.push(StepDefinition::new(1, StepRole::Processor));
  let updated = store.update_template(&id, edited).expect("update");
  assert_eq!(updated.id, id);
  assert_eq!(updated.created_at, t.created_at);
  assert_eq!(store.get_template(&id).unwrap().process.len(), 2);

  store.delete_template(&id).expect("delete");
  assert!(matches!(store.get_template(&id), Err(FormError::NotFound(_))));
  assert!(matches!(store.delete_template(&id), Err(FormError::NotFound(_))));
}

#[test]
fn update_rejects_invalid_template() {
  let store = InMemoryTemplateStore::new();
  let t = template("t", &[StepRole::Coordinator]);
  let id = store.create_template(t.clone()).unwrap();
  let mut broken = t;
  broken.process.clear();
  assert!(matches!(store.update_template(&id, broken), Err(FormError::ValidationError(_))));
}

#[test]
fn list_filters_by_role_and_name() {
  let store = InMemoryTemplateStore::new();
  store.create_template(template("Bảng điểm", &[StepRole::Coordinator])).unwrap();
  store.create_template(template("Thẻ sinh viên", &[StepRole::Coordinator, StepRole::Processor])).unwrap();

  let all = store.list_templates(&TemplateFilter::default()).unwrap();
  assert_eq!(all.len(), 2);

  let processor = store.list_templates(&TemplateFilter { involves_role: Some(StepRole::Processor),
                                                         ..Default::default() })
                       .unwrap();
  assert_eq!(processor.len(), 1);
  assert_eq!(processor[0].name, "Thẻ sinh viên");
  assert_eq!(processor[0].step_count, 2);

  let by_name = store.list_templates(&TemplateFilter { name_contains: Some("BẢNG".into()), ..Default::default() })
                     .unwrap();
  assert_eq!(by_name.len(), 1);
}
