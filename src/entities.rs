use std::sync::Arc;

use crate::columns::{ColumnSpec, ColumnType};

/// A list view of one API resource.
#[derive(Debug, Clone)]
pub struct EntityDef {
    /// Resource path segment, also the preset lookup key.
    pub name: &'static str,
    pub title: &'static str,
    pub empty_message: &'static str,
    pub schema: Arc<Vec<ColumnSpec>>,
    pub default_columns: Vec<String>,
}

impl EntityDef {
    fn new(
        name: &'static str,
        title: &'static str,
        empty_message: &'static str,
        schema: Vec<ColumnSpec>,
        defaults: &[&str],
    ) -> Self {
        Self {
            name,
            title,
            empty_message,
            schema: Arc::new(schema),
            default_columns: defaults.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn column_keys(&self) -> Vec<String> {
        crate::columns::column_keys(&self.schema)
    }
}

fn id() -> ColumnSpec {
    ColumnSpec::new("id", "ID", ColumnType::Number)
        .sortable(true)
        .width("80px")
}

fn created_at() -> ColumnSpec {
    ColumnSpec::new("created_at", "Cadastrado em", ColumnType::Date).sortable(true)
}

fn actions() -> ColumnSpec {
    ColumnSpec::new("actions", "Ações", ColumnType::Actions).width("120px")
}

fn text(key: &str, label: &str) -> ColumnSpec {
    ColumnSpec::new(key, label, ColumnType::Text)
}

pub fn catalogue() -> Vec<EntityDef> {
    vec![
        EntityDef::new(
            "clientes",
            "Clientes",
            "Nenhum cliente encontrado",
            vec![
                id(),
                text("nome", "Nome").sortable(true),
                text("cpf_cnpj", "CPF/CNPJ"),
                text("telefone", "Telefone"),
                text("email", "E-mail"),
                text("cidade", "Cidade").sortable(true),
                created_at(),
                actions(),
            ],
            &["id", "nome", "cpf_cnpj", "telefone", "actions"],
        ),
        EntityDef::new(
            "fornecedores",
            "Fornecedores",
            "Nenhum fornecedor encontrado",
            vec![
                id(),
                text("nome", "Nome").sortable(true),
                text("cnpj", "CNPJ"),
                text("telefone", "Telefone"),
                text("email", "E-mail"),
                text("contato", "Contato"),
                created_at(),
                actions(),
            ],
            &["id", "nome", "cnpj", "telefone", "actions"],
        ),
        EntityDef::new(
            "veiculos",
            "Veículos",
            "Nenhum veículo encontrado",
            vec![
                id(),
                text("placa", "Placa").sortable(true),
                text("marca", "Marca"),
                text("modelo", "Modelo"),
                ColumnSpec::new("ano", "Ano", ColumnType::Number).sortable(true),
                text("cliente.nome", "Cliente"),
                created_at(),
                actions(),
            ],
            &["id", "placa", "modelo", "cliente.nome", "actions"],
        ),
        EntityDef::new(
            "servicos",
            "Serviços",
            "Nenhum serviço encontrado",
            vec![
                id(),
                text("nome", "Nome").sortable(true),
                text("descricao", "Descrição"),
                ColumnSpec::new("valor", "Valor", ColumnType::Currency).sortable(true),
                ColumnSpec::new("ativo", "Situação", ColumnType::Status),
                created_at(),
                actions(),
            ],
            &["id", "nome", "valor", "ativo", "actions"],
        ),
        EntityDef::new(
            "ordens-servico",
            "Ordens de Serviço",
            "Nenhuma ordem de serviço encontrada",
            vec![
                id(),
                text("numero", "Número").sortable(true),
                text("cliente.nome", "Cliente"),
                text("veiculo.placa", "Veículo"),
                ColumnSpec::new("status", "Status", ColumnType::Status).sortable(true),
                ColumnSpec::new("valor_total", "Valor Total", ColumnType::Currency),
                ColumnSpec::new("data_abertura", "Abertura", ColumnType::Date).sortable(true),
                actions(),
            ],
            &["numero", "cliente.nome", "veiculo.placa", "status", "valor_total", "actions"],
        ),
    ]
}
